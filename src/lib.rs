//! vmate - OpenVPN profile tester
//!
//! Async library providing:
//! - Bounded concurrent dry-run testing of many `.ovpn` profiles
//! - Classification of OpenVPN client output
//! - A supervised keep-alive connection with failover through a
//!   history of known-good profiles
//! - Profile discovery, cipher fixing, geolocation and export helpers

pub mod error;
pub mod config;
pub mod profile;
pub mod vpn;
pub mod orchestrator;
pub mod supervisor;
pub mod reconnect;
pub mod history;
pub mod discovery;
pub mod geo;
pub mod cipher;
pub mod export;
pub mod progress;

// Re-export commonly used types
pub use error::{VmateError, VmateResult};
pub use config::VmateConfig;
pub use profile::{Profile, ResultSet, TestOutcome};
pub use vpn::{
    classify, ClientHandle, ClientLauncher, ClientTester, LaunchMode, LineClass,
    OpenVpnLauncher, ProfileTester,
};
pub use orchestrator::{ProgressSink, TestOrchestrator};
pub use supervisor::{
    ConnectionSupervisor, DropReason, Phase, SupervisionOutcome, SupervisionState,
};
pub use reconnect::{ConnectLoop, ReconnectContext, ReconnectDecision, ReconnectPolicy};
pub use history::{FileHistoryStore, HistoryEntry, HistoryStore};
pub use discovery::discover_profiles;
pub use geo::{IpInfoLocator, Locator, StaticLocator, UNKNOWN_LOCATION};
