//! Shared types and utilities for Editor Command Bridge.
//!
//! The bridge moves commands between an external controller process and a
//! long-lived editor host through a single shared directory of JSON files.
//! This crate holds everything both sides must agree on: the wire protocol,
//! command-id validation, the file store with atomic writes and TTL sweeps,
//! and the configuration defaults.

pub mod config;
pub mod errors;
pub mod id;
pub mod protocol;
pub mod store;

pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use id::CommandId;
pub use protocol::{
    Command, ConsoleEntry, EditorStatus, LogKind, Progress, Response, Status, TestFailure,
    TestSummary,
};
pub use store::FileStore;
