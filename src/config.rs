//! Configuration management for vmate
//!
//! A `VmateConfig` is built once (file, then command-line overrides) and
//! shared read-only by the orchestrator, tester and supervisor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{VmateError, VmateResult};

/// Main vmate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmateConfig {
    /// VPN client executable, also the name swept on exit
    #[serde(default = "default_client_binary")]
    pub client_binary: String,
    /// Maximum number of profiles tested at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Stop scheduling once this many profiles passed
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Per-profile deadline for batch testing (seconds)
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
    /// Deadline for the initial handshake in connect mode (seconds)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Echo neutral client output
    #[serde(default)]
    pub verbose: bool,
    /// Known-good profile list
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// ipinfo.io token for the lite country endpoint
    #[serde(default)]
    pub ipinfo_token: Option<String>,
}

fn default_client_binary() -> String {
    "openvpn".to_string()
}

fn default_max_workers() -> usize {
    10
}

fn default_limit() -> usize {
    100
}

fn default_test_timeout() -> u64 {
    16
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_history_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vmate-cli")
        .join("recent.txt")
}

impl Default for VmateConfig {
    fn default() -> Self {
        Self {
            client_binary: default_client_binary(),
            max_workers: default_max_workers(),
            limit: default_limit(),
            test_timeout_secs: default_test_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
            verbose: false,
            history_path: default_history_path(),
            ipinfo_token: None,
        }
    }
}

impl VmateConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> VmateResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| VmateError::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> VmateResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VmateError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| VmateError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Reject values that would stall a run
    pub fn validate(&self) -> VmateResult<()> {
        if self.max_workers == 0 {
            return Err(VmateError::InvalidParameter("max_workers must be at least 1".to_string()));
        }
        if self.limit == 0 {
            return Err(VmateError::InvalidParameter("limit must be at least 1".to_string()));
        }
        if self.client_binary.trim().is_empty() {
            return Err(VmateError::InvalidParameter("client_binary cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
