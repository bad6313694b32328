//! Failover policy and the connect-and-monitor loop
//!
//! A failed connection is retried once on the same profile. A second
//! consecutive failure drops the profile from history and moves on to the
//! first remaining entry. A connection that came up before failing earns a
//! fresh retry.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{VmateError, VmateResult};
use crate::history::{remove_profile, HistoryStore};
use crate::profile::Profile;
use crate::supervisor::{ConnectionSupervisor, SupervisionOutcome};
use crate::vpn::ClientLauncher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectContext {
    pub current_profile: Profile,
    pub retried_same_profile_once: bool,
}

/// What the loop should do after a supervised connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Same profile again
    Retry(Profile),
    /// Next profile from history
    FallBack(Profile),
    /// History has nothing left
    Exhausted,
    /// User cancelled
    Stop,
}

pub struct ReconnectPolicy {
    history: Arc<dyn HistoryStore>,
    context: ReconnectContext,
}

impl ReconnectPolicy {
    pub fn new(history: Arc<dyn HistoryStore>, start: Profile) -> Self {
        Self {
            history,
            context: ReconnectContext {
                current_profile: start,
                retried_same_profile_once: false,
            },
        }
    }

    pub fn context(&self) -> &ReconnectContext {
        &self.context
    }

    pub fn on_outcome(&mut self, outcome: &SupervisionOutcome) -> ReconnectDecision {
        if *outcome == SupervisionOutcome::UserCancelled {
            return ReconnectDecision::Stop;
        }

        if outcome.is_connection_drop() {
            self.context.retried_same_profile_once = false;
        }

        if !self.context.retried_same_profile_once {
            self.context.retried_same_profile_once = true;
            return ReconnectDecision::Retry(self.context.current_profile.clone());
        }

        self.context.retried_same_profile_once = false;
        let mut entries = self.history.load();
        remove_profile(&mut entries, &self.context.current_profile.path);
        if !self.history.save(&entries) {
            warn!("Could not persist history after dropping {}", self.context.current_profile);
        }

        match entries.first() {
            Some(next) => {
                self.context.current_profile = next.to_profile();
                ReconnectDecision::FallBack(self.context.current_profile.clone())
            }
            None => ReconnectDecision::Exhausted,
        }
    }
}

/// Keeps one connection alive, failing over through history
pub struct ConnectLoop {
    supervisor: ConnectionSupervisor,
    launcher: Arc<dyn ClientLauncher>,
    policy: ReconnectPolicy,
}

impl ConnectLoop {
    pub fn new(
        supervisor: ConnectionSupervisor,
        launcher: Arc<dyn ClientLauncher>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            supervisor,
            launcher,
            policy,
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Returns `Ok(())` on user cancellation, `HistoryExhausted` when no
    /// profile is left to fail over to. A client that cannot be launched
    /// ends the loop with its error and leaves history untouched.
    pub async fn run(mut self, cancel: &CancellationToken) -> VmateResult<()> {
        let mut profile = self.policy.context().current_profile.clone();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            info!("Connecting to {}", profile);
            let outcome = match self.supervisor.supervise(&profile, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Could not start the VPN client for {}: {}", profile, e);
                    return Err(e);
                }
            };

            match self.policy.on_outcome(&outcome) {
                ReconnectDecision::Stop => return Ok(()),
                ReconnectDecision::Retry(same) => {
                    warn!("Retrying {}", same);
                    self.launcher.sweep().await;
                    profile = same;
                }
                ReconnectDecision::FallBack(next) => {
                    warn!("Giving up on {}, switching to {}", profile, next);
                    profile = next;
                }
                ReconnectDecision::Exhausted => {
                    error!("{} failed and no alternative profiles are left", profile);
                    return Err(VmateError::HistoryExhausted);
                }
            }
        }
    }
}
