//! Rewrites legacy `cipher` directives that current OpenVPN clients reject

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::profile::Profile;

pub const LEGACY_CIPHER: &str = "cipher AES-128-CBC";
pub const DATA_CIPHERS: &str = "data-ciphers AES-256-GCM:AES-128-GCM:CHACHA20-POLY1305:AES-128-CBC";
/// First line of a rewritten profile
pub const MODIFIED_MARKER: &str = "#MODIFIED";

/// Rewritten text, or `None` if nothing to change
pub fn rewrite_ciphers(content: &str) -> Option<String> {
    if content.starts_with(MODIFIED_MARKER) {
        return None;
    }

    let mut modified = false;
    let lines: Vec<&str> = content
        .split('\n')
        .map(|line| {
            if line.trim().contains(LEGACY_CIPHER) {
                modified = true;
                DATA_CIPHERS
            } else {
                line
            }
        })
        .collect();

    modified.then(|| format!("{}\n{}", MODIFIED_MARKER, lines.join("\n")))
}

/// Rewrite every profile in place. Returns how many files changed.
pub fn fix_profile_ciphers(profiles: &[Profile]) -> usize {
    profiles
        .iter()
        .filter(|profile| fix_file(&profile.path))
        .count()
}

fn fix_file(path: &Path) -> bool {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Skipping {:?}: {}", path, e);
            return false;
        }
    };

    let Some(rewritten) = rewrite_ciphers(&content) else {
        return false;
    };

    match fs::write(path, rewritten) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to rewrite {:?}: {}", path, e);
            false
        }
    }
}
