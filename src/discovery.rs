//! Profile discovery on disk

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{VmateError, VmateResult};
use crate::profile::Profile;

/// File extension of OpenVPN profiles
pub const PROFILE_EXTENSION: &str = "ovpn";

/// Recursively collect `.ovpn` files under `root`, sorted by path.
///
/// Fails only when `root` itself cannot be read; unreadable subdirectories
/// are skipped.
pub fn discover_profiles(root: &Path) -> VmateResult<Vec<Profile>> {
    let entries = fs::read_dir(root).map_err(|source| VmateError::DiscoveryIo {
        path: root.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    let mut pending: Vec<_> = entries.flatten().map(|e| e.path()).collect();

    while let Some(path) = pending.pop() {
        if path.is_dir() {
            match fs::read_dir(&path) {
                Ok(entries) => pending.extend(entries.flatten().map(|e| e.path())),
                Err(e) => warn!("Skipping unreadable directory {:?}: {}", path, e),
            }
        } else if path.extension().is_some_and(|ext| ext == PROFILE_EXTENSION) {
            found.push(path);
        }
    }

    found.sort();
    debug!("Discovered {} profiles under {:?}", found.len(), root);
    Ok(found.into_iter().map(Profile::new).collect())
}

/// Host of the first `remote` directive in profile text
pub fn parse_remote_host(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("remote"), Some(host)) => Some(host.to_string()),
                _ => None,
            }
        })
}

/// Read a profile and return its remote host
pub fn extract_remote_host(path: &Path) -> VmateResult<Option<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_remote_host(&content))
}
