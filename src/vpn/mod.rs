//! VPN client plumbing
//!
//! ```text
//! ┌──────────────┐   lines   ┌────────────┐   verdict
//! │ ClientHandle │ ────────► │ classifier │ ──────────► tester / supervisor
//! └──────▲───────┘           └────────────┘
//!        │ launch / kill_group / sweep
//! ┌──────┴─────────┐
//! │ ClientLauncher │  (OpenVpnLauncher in production)
//! └────────────────┘
//! ```

pub mod classifier;
pub mod process;
pub mod tester;

pub use classifier::{classify, FailureKind, FailureReason, LineClass, SUCCESS_MARKER};
pub use process::{ClientHandle, ClientLauncher, LaunchMode, OpenVpnLauncher};
pub use tester::{ClientTester, ProfileTester};
