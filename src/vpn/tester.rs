//! Single profile dry-run test

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::profile::Profile;
use super::classifier::{classify, LineClass};
use super::process::{ClientHandle, ClientLauncher, LaunchMode};

/// Tests one profile and reports pass/fail
#[async_trait]
pub trait ProfileTester: Send + Sync {
    async fn test(&self, profile: &Profile, cancel: &CancellationToken) -> bool;
}

/// Runs the VPN client in dry-test mode and watches its output
pub struct ClientTester {
    launcher: Arc<dyn ClientLauncher>,
    timeout: Duration,
    verbose: bool,
}

impl ClientTester {
    pub fn new(launcher: Arc<dyn ClientLauncher>, timeout: Duration, verbose: bool) -> Self {
        Self {
            launcher,
            timeout,
            verbose,
        }
    }

    /// Reads lines until the first success or failure marker
    async fn watch(&self, handle: &mut dyn ClientHandle, profile: &Profile) -> bool {
        while let Some(line) = handle.next_line().await {
            match classify(&line) {
                LineClass::Success => return true,
                LineClass::Failure(reason) => {
                    debug!("{}: {} ({:?})", profile, reason.marker, reason.kind);
                    return false;
                }
                LineClass::Neutral => {
                    if self.verbose {
                        info!("[{}] {}", profile.path.display(), line.trim());
                    }
                }
            }
        }
        debug!("{}: output ended without a verdict", profile);
        false
    }
}

#[async_trait]
impl ProfileTester for ClientTester {
    async fn test(&self, profile: &Profile, cancel: &CancellationToken) -> bool {
        let mut handle = match self.launcher.launch(&profile.path, LaunchMode::DryTest).await {
            Ok(handle) => handle,
            Err(e) => {
                debug!("{}: {}", profile, e);
                return false;
            }
        };

        let passed = tokio::select! {
            passed = self.watch(handle.as_mut(), profile) => passed,
            _ = tokio::time::sleep(self.timeout) => {
                debug!("{}: timed out after {:?}", profile, self.timeout);
                false
            }
            _ = cancel.cancelled() => false,
        };

        handle.kill_group();
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmateResult;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed script, then either ends the stream or hangs
    struct Scripted {
        lines: VecDeque<String>,
        hang: bool,
        kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ClientHandle for Scripted {
        async fn next_line(&mut self) -> Option<String> {
            match self.lines.pop_front() {
                Some(line) => Some(line),
                None if self.hang => std::future::pending().await,
                None => None,
            }
        }

        fn kill_group(&mut self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptLauncher {
        lines: Vec<&'static str>,
        hang: bool,
        kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ClientLauncher for ScriptLauncher {
        async fn launch(&self, _profile: &Path, mode: LaunchMode) -> VmateResult<Box<dyn ClientHandle>> {
            assert_eq!(mode, LaunchMode::DryTest);
            Ok(Box::new(Scripted {
                lines: self.lines.iter().map(|s| s.to_string()).collect(),
                hang: self.hang,
                kills: self.kills.clone(),
            }))
        }

        async fn sweep(&self) {}
    }

    fn tester(lines: Vec<&'static str>, hang: bool) -> (ClientTester, Arc<AtomicUsize>) {
        let kills = Arc::new(AtomicUsize::new(0));
        let launcher = ScriptLauncher { lines, hang, kills: kills.clone() };
        (ClientTester::new(Arc::new(launcher), Duration::from_millis(200), false), kills)
    }

    #[tokio::test]
    async fn test_success_marker_passes() {
        let (tester, kills) = tester(vec!["Peer Connection Initiated", "Initialization Sequence Completed"], true);
        assert!(tester.test(&Profile::new("/a.ovpn"), &CancellationToken::new()).await);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_marker_fails() {
        let (tester, kills) = tester(vec!["AUTH_FAILED", "Initialization Sequence Completed"], true);
        assert!(!tester.test(&Profile::new("/a.ovpn"), &CancellationToken::new()).await);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_end_fails() {
        let (tester, kills) = tester(vec!["some output"], false);
        assert!(!tester.test(&Profile::new("/a.ovpn"), &CancellationToken::new()).await);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_client_times_out() {
        let (tester, kills) = tester(vec![], true);
        let started = std::time::Instant::now();
        assert!(!tester.test(&Profile::new("/a.ovpn"), &CancellationToken::new()).await);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_fails_fast() {
        let (tester, kills) = tester(vec![], true);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!tester.test(&Profile::new("/a.ovpn"), &cancel).await);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }
}
