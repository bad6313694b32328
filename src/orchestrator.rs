//! Bounded concurrent profile testing
//!
//! Profiles are started in input order, at most `max_workers` at a time.
//! Once `limit` profiles passed, a child cancellation token (the limit token)
//! stops scheduling; tests already running finish on their own. A user
//! cancellation aborts everything, running tests included.

use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::VmateConfig;
use crate::geo::Locator;
use crate::profile::{Profile, ResultSet, TestOutcome};
use crate::vpn::ProfileTester;

/// Receives one signal per finished unit of work. Called from many tasks.
pub trait ProgressSink: Send + Sync {
    fn advance(&self);
}

/// Runs a tester across many profiles
pub struct TestOrchestrator {
    config: Arc<VmateConfig>,
    tester: Arc<dyn ProfileTester>,
    locator: Arc<dyn Locator>,
}

impl TestOrchestrator {
    pub fn new(
        config: Arc<VmateConfig>,
        tester: Arc<dyn ProfileTester>,
        locator: Arc<dyn Locator>,
    ) -> Self {
        Self {
            config,
            tester,
            locator,
        }
    }

    /// Test `profiles` and return the ones that passed, at most `limit`
    pub async fn run(
        &self,
        profiles: Vec<Profile>,
        cancel: &CancellationToken,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> ResultSet {
        let limit = self.config.limit;
        let max_workers = self.config.max_workers.max(1);
        let total = profiles.len();

        let results = Arc::new(Mutex::new(ResultSet::with_limit(limit)));
        let limit_token = cancel.child_token();
        let slots = Arc::new(Semaphore::new(max_workers));
        let mut workers = JoinSet::new();

        info!(
            "Testing {} profiles ({} workers, limit {})",
            total, max_workers, limit
        );

        for profile in profiles {
            if limit_token.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = limit_token.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let unit = WorkUnit {
                profile,
                tester: self.tester.clone(),
                locator: self.locator.clone(),
                results: results.clone(),
                limit_token: limit_token.clone(),
                cancel: cancel.clone(),
            };
            let progress = progress.clone();

            workers.spawn(async move {
                unit.run().await;
                drop(permit);
                if let Some(sink) = progress {
                    sink.advance();
                }
            });
        }

        let scheduled = workers.len();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Test worker failed: {}", e);
            }
        }

        let results = std::mem::take(&mut *results.lock().await);
        info!(
            "{} passed, {} of {} profiles scheduled",
            results.len(),
            scheduled,
            total
        );
        results
    }
}

/// One profile's worth of work
struct WorkUnit {
    profile: Profile,
    tester: Arc<dyn ProfileTester>,
    locator: Arc<dyn Locator>,
    results: Arc<Mutex<ResultSet>>,
    limit_token: CancellationToken,
    cancel: CancellationToken,
}

impl WorkUnit {
    async fn run(self) {
        if self.limit_token.is_cancelled() {
            return;
        }

        if !self.tester.test(&self.profile, &self.cancel).await {
            debug!("[FAILED] {}", self.profile);
            return;
        }

        // Several workers can pass at once; the lock covers check and append
        let mut results = self.results.lock().await;
        if results.is_full() {
            debug!("{} passed after the limit was reached", self.profile);
            return;
        }

        let label = self.locator.resolve(&self.profile.path).await;
        let profile = Profile::with_label(self.profile.path, label);
        info!("[SUCCESS] {}", profile);

        results.push(TestOutcome {
            profile,
            passed: true,
        });
        if results.is_full() {
            debug!("Success limit reached, no further profiles will be scheduled");
            self.limit_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::StaticLocator;
    use async_trait::async_trait;

    struct PassEvery(usize);

    #[async_trait]
    impl ProfileTester for PassEvery {
        async fn test(&self, profile: &Profile, _cancel: &CancellationToken) -> bool {
            let index: usize = profile
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            index % self.0 == 0
        }
    }

    fn profiles(n: usize) -> Vec<Profile> {
        (0..n).map(|i| Profile::new(format!("/vpn/{}.ovpn", i))).collect()
    }

    fn orchestrator(workers: usize, limit: usize, tester: impl ProfileTester + 'static) -> TestOrchestrator {
        let config = VmateConfig {
            max_workers: workers,
            limit,
            ..VmateConfig::default()
        };
        TestOrchestrator::new(
            Arc::new(config),
            Arc::new(tester),
            Arc::new(StaticLocator("JP".to_string())),
        )
    }

    #[tokio::test]
    async fn test_only_passing_profiles_are_returned() {
        let results = orchestrator(4, 100, PassEvery(3))
            .run(profiles(10), &CancellationToken::new(), None)
            .await;

        let mut paths: Vec<_> = results.profiles().map(|p| p.path.clone()).collect();
        paths.sort();
        let expected: Vec<_> = [0, 3, 6, 9]
            .iter()
            .map(|i| std::path::PathBuf::from(format!("/vpn/{}.ovpn", i)))
            .collect();
        assert_eq!(paths, expected);
        assert!(results.iter().all(|o| o.passed && o.profile.location_label == "JP"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results = orchestrator(4, 5, PassEvery(1))
            .run(Vec::new(), &CancellationToken::new(), None)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_schedules_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = orchestrator(4, 5, PassEvery(1))
            .run(profiles(10), &cancel, None)
            .await;
        assert!(results.is_empty());
    }
}
