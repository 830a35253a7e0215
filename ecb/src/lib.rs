//! Controller CLI for Editor Command Bridge.
//!
//! Submits one command per invocation to the host on the other side of
//! the shared store directory and renders the terminal response. The
//! library half exists so integration tests can drive the same client
//! the binary uses.

pub mod client;
pub mod format;

pub use client::{BridgeClient, ClientError, EXIT_FAILURE, EXIT_SUCCESS, EXIT_TIMEOUT};
pub use format::format_response;
