//! Error types for vmate

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmateError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Profile root could not be read, nothing to test
    #[error("Cannot read profile directory {path:?}: {source}")]
    DiscoveryIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failover ran out of known-good profiles
    #[error("No alternative profiles available")]
    HistoryExhausted,
    /// VPN client could not be started
    #[error("Failed to launch {binary}: {reason}")]
    Launch { binary: String, reason: String },
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<toml::de::Error> for VmateError {
    fn from(error: toml::de::Error) -> Self {
        VmateError::Config(error.to_string())
    }
}

pub type VmateResult<T> = Result<T, VmateError>;
