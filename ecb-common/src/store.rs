//! The shared file store.
//!
//! One flat directory holds at most one pending `command.json`,
//! zero-or-more id-keyed `response-{id}.json` files, and transient `*.tmp`
//! scratch files. This directory is the only state shared across the
//! process boundary. All writes are atomic: serialize to a scratch file in
//! the same directory, then rename into place, so readers never observe a
//! torn file.

use crate::errors::BridgeError;
use crate::id::{CommandId, is_valid_id};
use crate::protocol::{Command, Response};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Name of the single pending command file.
pub const COMMAND_FILE: &str = "command.json";

const RESPONSE_PREFIX: &str = "response-";
const TMP_SUFFIX: &str = ".tmp";

/// Handle to the bridge directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Create the store directory with owner-only permissions.
    ///
    /// Returns `true` if the directory was created by this call. Refuses a
    /// symlinked store directory outright.
    pub fn ensure_dir(&self) -> Result<bool, BridgeError> {
        if let Ok(meta) = fs::symlink_metadata(&self.dir)
            && meta.file_type().is_symlink()
        {
            return Err(BridgeError::SymlinkStore(self.dir.clone()));
        }

        if self.dir.is_dir() {
            return Ok(false);
        }

        fs::create_dir_all(&self.dir).map_err(|source| BridgeError::CreateDir {
            dir: self.dir.clone(),
            source,
        })?;
        restrict_permissions(&self.dir, 0o700);
        Ok(true)
    }

    pub fn command_path(&self) -> PathBuf {
        self.dir.join(COMMAND_FILE)
    }

    /// Path of the response file for a validated id.
    pub fn response_path(&self, id: &CommandId) -> PathBuf {
        self.dir.join(format!("{RESPONSE_PREFIX}{id}.json"))
    }

    /// Serialize `value` to a sibling scratch file, then atomically rename
    /// it to `path`. The scratch file is removed on any failure.
    pub fn write_json_atomic<T: Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), BridgeError> {
        let tmp = scratch_path(path);
        let body = serde_json::to_vec_pretty(value).map_err(|source| BridgeError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        if let Err(source) = fs::write(&tmp, &body) {
            let _ = fs::remove_file(&tmp);
            return Err(BridgeError::Write { path: tmp, source });
        }
        restrict_permissions(&tmp, 0o600);

        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(BridgeError::Write {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }

    /// Atomically publish a command file.
    pub fn write_command(&self, cmd: &Command) -> Result<(), BridgeError> {
        self.write_json_atomic(&self.command_path(), cmd)
    }

    /// Atomically publish (or replace) the response for `resp.id`.
    ///
    /// The id token is re-checked even though [`CommandId`] is validated at
    /// construction; a response is never written under a path built from an
    /// unvalidated id.
    pub fn write_response(&self, resp: &Response) -> Result<(), BridgeError> {
        if !is_valid_id(resp.id.as_str()) {
            warn!(id = %resp.id, "refusing to write response for invalid id");
            return Err(BridgeError::InvalidId);
        }
        self.write_json_atomic(&self.response_path(&resp.id), resp)
    }

    /// Remove the pending command file if present.
    pub fn remove_command(&self) -> bool {
        fs::remove_file(self.command_path()).is_ok()
    }

    /// Remove the response and scratch files for one id, if present.
    pub fn remove_response(&self, id: &CommandId) {
        let path = self.response_path(id);
        let _ = fs::remove_file(scratch_path(&path));
        let _ = fs::remove_file(path);
    }

    /// TTL sweep: delete `response-*.json` and `*.tmp` files older than
    /// `ttl`. Returns the number of files removed. A second consecutive
    /// sweep with no new activity removes nothing.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let is_response = name.starts_with(RESPONSE_PREFIX) && name.ends_with(".json");
            let is_scratch = name.ends_with(TMP_SUFFIX);
            if !is_response && !is_scratch {
                continue;
            }

            let path = entry.path();
            match file_age(&path) {
                Some(age) if age > ttl => {
                    if fs::remove_file(&path).is_ok() {
                        debug!(file = name, age_secs = age.as_secs(), "swept stale file");
                        removed += 1;
                    }
                }
                _ => {}
            }
        }
        removed
    }

    /// Delete an orphaned `command.json` older than `max_age` (a prior
    /// submission abandoned while no host was running). Returns whether a
    /// file was removed.
    pub fn sweep_stale_command(&self, max_age: Duration) -> bool {
        let path = self.command_path();
        match file_age(&path) {
            Some(age) if age > max_age => {
                let removed = fs::remove_file(&path).is_ok();
                if removed {
                    debug!(age_secs = age.as_secs(), "removed stale command file");
                }
                removed
            }
            _ => false,
        }
    }
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scratch".to_string());
    name.push_str(TMP_SUFFIX);
    path.with_file_name(name)
}

fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) {}
