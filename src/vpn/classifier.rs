//! Classification of VPN client output lines
//!
//! Matching is a plain case-sensitive substring search over the trimmed line.
//! The success marker is checked first, then the failure table in order.

/// Printed by OpenVPN once the tunnel is fully up
pub const SUCCESS_MARKER: &str = "Initialization Sequence Completed";

/// Revision of [`FAILURE_MARKERS`], bump when the table changes
pub const MARKER_TABLE_VERSION: u32 = 2;

/// Broad kind of a fatal client condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Auth,
    Routing,
    Dns,
    Tls,
    Device,
    Restart,
}

/// Known fatal substrings and what they mean
pub const FAILURE_MARKERS: &[(&str, FailureKind)] = &[
    ("No route to host", FailureKind::Routing),
    ("TLS key negotiation failed", FailureKind::Tls),
    ("Connection timed out", FailureKind::Timeout),
    ("Connection refused", FailureKind::Routing),
    ("AUTH_FAILED", FailureKind::Auth),
    ("Network unreachable", FailureKind::Routing),
    ("Host is down", FailureKind::Routing),
    ("Name or service not known", FailureKind::Dns),
    ("VERIFY ERROR", FailureKind::Tls),
    ("certificate verify failed", FailureKind::Tls),
    ("Inactivity timeout", FailureKind::Timeout),
    ("Ping timeout", FailureKind::Timeout),
    ("Cannot open TUN/TAP dev", FailureKind::Device),
    ("write to TUN/TAP: Input/output error", FailureKind::Device),
    ("read: Connection reset by peer", FailureKind::Routing),
    ("handshake failure", FailureKind::Tls),
    ("fatal error", FailureKind::Restart),
    ("Restart pause", FailureKind::Restart),
    ("process exiting", FailureKind::Restart),
    ("killed", FailureKind::Restart),
];

/// A matched failure marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReason {
    pub marker: &'static str,
    pub kind: FailureKind,
}

/// Classification of a single output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Success,
    Failure(FailureReason),
    Neutral,
}

/// Classify one line of client output
pub fn classify(line: &str) -> LineClass {
    let line = line.trim();

    if line.contains(SUCCESS_MARKER) {
        return LineClass::Success;
    }

    FAILURE_MARKERS
        .iter()
        .find(|(marker, _)| line.contains(marker))
        .map(|&(marker, kind)| LineClass::Failure(FailureReason { marker, kind }))
        .unwrap_or(LineClass::Neutral)
}
