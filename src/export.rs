//! Copy known-good profiles out under location-prefixed names

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::VmateResult;
use crate::history::HistoryEntry;

/// `<label>_<file name>` with spaces replaced by underscores
pub fn export_name(entry: &HistoryEntry) -> Option<String> {
    let file_name = entry.path.file_name()?.to_string_lossy().replace(' ', "_");
    Some(format!("{}_{}", entry.label, file_name))
}

/// Copy each entry into `dest`, creating it if needed.
/// Entries that cannot be copied are skipped. Returns the written paths.
pub fn export_profiles(entries: &[HistoryEntry], dest: &Path) -> VmateResult<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;

    let mut written = Vec::new();
    for entry in entries {
        let Some(name) = export_name(entry) else {
            continue;
        };
        let target = dest.join(&name);
        match fs::copy(&entry.path, &target) {
            Ok(_) => {
                info!("Exported: {}", name);
                written.push(target);
            }
            Err(e) => warn!("Failed to export {:?}: {}", entry.path, e),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_name() {
        let entry = HistoryEntry::new("JP", "/vpn/Tokyo server 1.ovpn");
        assert_eq!(export_name(&entry).as_deref(), Some("JP_Tokyo_server_1.ovpn"));
    }

    #[test]
    fn test_export_skips_missing_sources() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let present = src.path().join("kr 2.ovpn");
        fs::write(&present, "remote kr.example 1194\n").unwrap();

        let entries = vec![
            HistoryEntry::new("KR", &present),
            HistoryEntry::new("US", src.path().join("gone.ovpn")),
        ];
        let out = dest.path().join("out");
        let written = export_profiles(&entries, &out).unwrap();

        assert_eq!(written, vec![out.join("KR_kr_2.ovpn")]);
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            "remote kr.example 1194\n"
        );
    }
}
