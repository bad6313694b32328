//! Supervision of one long-lived VPN connection
//!
//! ```text
//!              success marker
//! Handshaking ────────────────► Connected
//!     │  failure marker,            │  failure marker,
//!     │  stream end,                │  stream end
//!     │  handshake deadline         ▼
//!     └─────────────────────────► Failed
//!
//! any state ── cancellation ──► UserCancelled
//! ```
//!
//! The client's process group is killed on every exit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VmateResult;
use crate::profile::Profile;
use crate::vpn::{classify, ClientHandle, ClientLauncher, FailureReason, LaunchMode, LineClass};

/// Where a supervised connection currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionState {
    Handshaking,
    Connected,
    Failed,
    UserCancelled,
}

/// Phase a connection failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handshake,
    Connected,
}

/// Why a supervised connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    HandshakeTimeout,
    Marker(FailureReason),
    StreamEnded,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::HandshakeTimeout => write!(f, "handshake timeout"),
            DropReason::Marker(reason) => write!(f, "{}", reason.marker),
            DropReason::StreamEnded => write!(f, "client output ended"),
        }
    }
}

/// Terminal result of [`ConnectionSupervisor::supervise`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionOutcome {
    Failed { phase: Phase, reason: DropReason },
    UserCancelled,
}

impl SupervisionOutcome {
    /// A failure after the tunnel was up
    pub fn is_connection_drop(&self) -> bool {
        matches!(self, SupervisionOutcome::Failed { phase: Phase::Connected, .. })
    }
}

/// Runs one profile in connect mode until it fails or the user cancels
pub struct ConnectionSupervisor {
    launcher: Arc<dyn ClientLauncher>,
    handshake_timeout: Duration,
    verbose: bool,
    state: watch::Sender<SupervisionState>,
}

impl ConnectionSupervisor {
    pub fn new(launcher: Arc<dyn ClientLauncher>, handshake_timeout: Duration, verbose: bool) -> Self {
        let (state, _) = watch::channel(SupervisionState::Handshaking);
        Self {
            launcher,
            handshake_timeout,
            verbose,
            state,
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SupervisionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SupervisionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SupervisionState) {
        self.state.send_replace(state);
    }

    /// Launch errors are returned as `Err`: a client that never started
    /// says nothing about the profile.
    pub async fn supervise(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> VmateResult<SupervisionOutcome> {
        self.set_state(SupervisionState::Handshaking);

        let mut handle = match self.launcher.launch(&profile.path, LaunchMode::Connect).await {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(SupervisionState::Failed);
                return Err(e);
            }
        };

        let outcome = self.monitor(handle.as_mut(), profile, cancel).await;
        handle.kill_group();

        match &outcome {
            SupervisionOutcome::UserCancelled => {
                debug!("Connection to {} cancelled", profile);
                self.set_state(SupervisionState::UserCancelled);
            }
            SupervisionOutcome::Failed { phase: Phase::Handshake, reason } => {
                warn!("Handshake with {} failed: {}", profile, reason);
                self.set_state(SupervisionState::Failed);
            }
            SupervisionOutcome::Failed { phase: Phase::Connected, reason } => {
                warn!("Connection to {} dropped: {}", profile, reason);
                self.set_state(SupervisionState::Failed);
            }
        }
        Ok(outcome)
    }

    async fn monitor(
        &self,
        handle: &mut dyn ClientHandle,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> SupervisionOutcome {
        let deadline = tokio::time::sleep(self.handshake_timeout);
        tokio::pin!(deadline);
        let mut phase = Phase::Handshake;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SupervisionOutcome::UserCancelled,
                _ = &mut deadline, if phase == Phase::Handshake => {
                    return SupervisionOutcome::Failed {
                        phase,
                        reason: DropReason::HandshakeTimeout,
                    };
                }
                line = handle.next_line() => {
                    let Some(line) = line else {
                        return SupervisionOutcome::Failed {
                            phase,
                            reason: DropReason::StreamEnded,
                        };
                    };
                    match classify(&line) {
                        LineClass::Success => {
                            if phase == Phase::Handshake {
                                phase = Phase::Connected;
                                self.set_state(SupervisionState::Connected);
                                info!("Connected successfully to {}", profile);
                            }
                        }
                        LineClass::Failure(reason) => {
                            return SupervisionOutcome::Failed {
                                phase,
                                reason: DropReason::Marker(reason),
                            };
                        }
                        LineClass::Neutral => {
                            if self.verbose {
                                info!("{}", line.trim());
                            }
                        }
                    }
                }
            }
        }
    }
}
