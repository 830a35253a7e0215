//! Capability seams between the dispatcher and host internals.
//!
//! The dispatcher never touches editor state directly. A host exposes two
//! narrow capabilities: a probe for transient busy conditions, and a
//! console source for recent log entries. Real hosts back these with their
//! own internals; the loopback host backs them with in-memory state.

use ecb_common::{ConsoleEntry, LogKind};

/// Actions that are safe to run while the host is in a transient busy
/// condition (mid-compile, asset refresh). Everything else is rejected
/// until the host settles, so mutating actions never race a host state
/// transition. Static configuration, not runtime state.
pub const READ_ONLY_ACTIONS: &[&str] = &["get-status", "get-console-logs"];

pub fn is_read_only(action: &str) -> bool {
    READ_ONLY_ACTIONS.contains(&action)
}

/// A transient host condition that blocks mutating actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyCondition {
    /// Short human-readable reason, e.g. "compiling scripts".
    pub reason: String,
}

impl BusyCondition {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for BusyCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Host-state probe consulted once per tick before dispatch.
pub trait HostProbe: Send + Sync {
    /// The transient condition incompatible with mutating actions, if any.
    fn busy(&self) -> Option<BusyCondition>;
}

/// A probe for hosts that are never transiently busy.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleProbe;

impl HostProbe for IdleProbe {
    fn busy(&self) -> Option<BusyCondition> {
        None
    }
}

/// Access to recent host console/log entries, with type and optional
/// trace. Keeps the dispatcher independent of how the host stores logs.
pub trait ConsoleSource: Send + Sync {
    fn recent(&self, limit: usize, filter: Option<LogKind>) -> Vec<ConsoleEntry>;
}
