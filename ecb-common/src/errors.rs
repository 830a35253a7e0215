//! Error definitions shared by both sides of the bridge.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the shared protocol and file-store layers.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A command id failed the strict token pattern. Such an id must never
    /// be embedded in a filesystem path.
    #[error("invalid command id format")]
    InvalidId,

    /// The store directory is a symlink; refusing to follow it.
    #[error("bridge directory {0} is a symlink; refusing to use it")]
    SymlinkStore(PathBuf),

    #[error("failed to create bridge directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
