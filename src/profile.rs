//! Profile and outcome types shared by the tester, orchestrator and supervisor

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// One VPN connection configuration, identified by its path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Profile {
    pub path: PathBuf,
    /// Empty until geolocation ran
    pub location_label: String,
}

impl Profile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            location_label: String::new(),
        }
    }

    pub fn with_label(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            location_label: label.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location_label.is_empty() {
            write!(f, "{}", self.path.display())
        } else {
            write!(f, "{} -- {}", self.path.display(), self.location_label)
        }
    }
}

/// Result of testing one profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub profile: Profile,
    pub passed: bool,
}

/// Successful outcomes of one run, in completion order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    outcomes: Vec<TestOutcome>,
    limit: usize,
}

impl ResultSet {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            outcomes: Vec::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_full(&self) -> bool {
        self.outcomes.len() >= self.limit
    }

    /// Appends unless the set is already full. Returns whether it was added.
    pub fn push(&mut self, outcome: TestOutcome) -> bool {
        if self.is_full() {
            return false;
        }
        self.outcomes.push(outcome);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.outcomes.iter().map(|o| &o.profile)
    }

    pub fn into_outcomes(self) -> Vec<TestOutcome> {
        self.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_set_never_exceeds_limit() {
        let mut set = ResultSet::with_limit(2);
        for i in 0..5 {
            set.push(TestOutcome {
                profile: Profile::new(format!("/tmp/{}.ovpn", i)),
                passed: true,
            });
        }
        assert_eq!(set.len(), 2);
        assert!(set.is_full());
    }

    #[test]
    fn test_profile_display() {
        assert_eq!(Profile::new("/a.ovpn").to_string(), "/a.ovpn");
        assert_eq!(Profile::with_label("/a.ovpn", "JP").to_string(), "/a.ovpn -- JP");
    }
}
