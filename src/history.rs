//! Known-good profile history
//!
//! Stored as one `label;;path` line per entry and always rewritten wholesale.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::profile::{Profile, TestOutcome};

const FIELD_SEPARATOR: &str = ";;";

/// One remembered profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub label: String,
    pub path: PathBuf,
}

impl HistoryEntry {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }

    pub fn to_profile(&self) -> Profile {
        Profile::with_label(self.path.clone(), self.label.clone())
    }

    fn to_line(&self) -> String {
        format!("{}{}{}", self.label, FIELD_SEPARATOR, self.path.display())
    }

    fn parse_line(line: &str) -> Option<Self> {
        let (label, path) = line.split_once(FIELD_SEPARATOR)?;
        if path.is_empty() {
            return None;
        }
        Some(Self::new(label, path))
    }
}

impl From<&TestOutcome> for HistoryEntry {
    fn from(outcome: &TestOutcome) -> Self {
        Self::new(outcome.profile.location_label.clone(), outcome.profile.path.clone())
    }
}

/// Persistence of the known-good list
#[cfg_attr(test, mockall::automock)]
pub trait HistoryStore: Send + Sync {
    /// Entries in stored order, empty if nothing was persisted
    fn load(&self) -> Vec<HistoryEntry>;

    /// Replace the stored list. Returns false on write errors.
    fn save(&self, entries: &[HistoryEntry]) -> bool;
}

/// History kept in a flat text file
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self) -> Vec<HistoryEntry> {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.lines().filter_map(HistoryEntry::parse_line).collect(),
            Err(e) => {
                debug!("No history at {:?}: {}", self.path, e);
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[HistoryEntry]) -> bool {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create {:?}: {}", parent, e);
                return false;
            }
        }

        let mut content = String::new();
        for entry in entries {
            content.push_str(&entry.to_line());
            content.push('\n');
        }

        match fs::write(&self.path, content) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write history {:?}: {}", self.path, e);
                false
            }
        }
    }
}

/// Drop every entry for `path`, keeping the order of the rest
pub fn remove_profile(entries: &mut Vec<HistoryEntry>, path: &Path) -> bool {
    let before = entries.len();
    entries.retain(|e| e.path != path);
    entries.len() != before
}
