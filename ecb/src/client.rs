//! Controller-side submit/poll client.
//!
//! One [`BridgeClient::submit`] call is one complete exchange: hygiene
//! sweeps, atomic command write, exponential-backoff polling for the
//! response, and cleanup of the controller's own files. The controller is
//! deliberately synchronous; a CLI invocation has nothing else to do while
//! it waits.

use ecb_common::BridgeConfig;
use ecb_common::errors::BridgeError;
use ecb_common::id::CommandId;
use ecb_common::protocol::{Command, Progress, Response, Status};
use ecb_common::store::FileStore;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause after first seeing a response file, so a host still mid-rename
/// on a non-atomic filesystem gets to finish.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Pause before the single re-read after a torn parse.
const REPARSE_DELAY: Duration = Duration::from_millis(200);

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_TIMEOUT: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(
        "host not detected: {} does not exist; is the editor open with the bridge enabled?",
        dir.display()
    )]
    HostNotRunning { dir: PathBuf },

    #[error(
        "command {action} ({id}) timed out after {}s; check the host console for errors",
        timeout.as_secs()
    )]
    Timeout {
        id: CommandId,
        action: String,
        timeout: Duration,
    },

    #[error("unparseable response at {}: {source}", path.display())]
    MalformedResponse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] BridgeError),
}

impl ClientError {
    /// Timeouts are distinguishable from failures so callers can retry
    /// with a longer deadline instead of re-diagnosing.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Timeout { .. } => EXIT_TIMEOUT,
            _ => EXIT_FAILURE,
        }
    }
}

enum Polled {
    Terminal(Response),
    KeepWaiting,
}

pub struct BridgeClient {
    store: FileStore,
    config: BridgeConfig,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Self {
        let store = FileStore::new(config.dir.clone());
        Self { store, config }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Submit a command and block until its terminal response or the
    /// deadline. The controller's own response file is removed on every
    /// exit path.
    pub fn submit(
        &self,
        action: &str,
        params: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        self.submit_with_progress(action, params, timeout, |_| {})
    }

    /// [`Self::submit`] with a callback invoked for each non-terminal
    /// `running` update the host publishes.
    pub fn submit_with_progress(
        &self,
        action: &str,
        params: BTreeMap<String, String>,
        timeout: Duration,
        mut on_progress: impl FnMut(&Progress),
    ) -> Result<Response, ClientError> {
        if self.store.ensure_dir()? {
            info!(dir = %self.store.dir().display(), "created bridge directory");
            gitignore_notice(self.store.dir());
        }

        // Routine hygiene before every submit: old responses past the
        // TTL, plus a command file nobody consumed within its timeout.
        let swept = self.store.sweep(self.config.response_ttl);
        if swept > 0 {
            debug!(count = swept, "swept stale bridge files");
        }
        if self.store.sweep_stale_command(timeout) {
            warn!("removed stale command file from an earlier run");
        }

        let cmd = Command::new(action, params);
        debug!(id = %cmd.id, action, "submitting command");
        self.store.write_command(&cmd)?;

        let outcome = self.poll(&cmd.id, action, timeout, &mut on_progress);
        // The consumed response is this controller's to delete; the
        // command file belongs to the host once written.
        self.store.remove_response(&cmd.id);
        outcome
    }

    /// Quick round-trip probe: `get-status` with a short deadline.
    pub fn health_check(&self, timeout: Duration) -> Result<Response, ClientError> {
        if !self.store.dir().exists() {
            return Err(ClientError::HostNotRunning {
                dir: self.store.dir().to_path_buf(),
            });
        }
        self.submit(
            "get-status",
            BTreeMap::new(),
            timeout.min(Duration::from_secs(5)),
        )
    }

    fn poll(
        &self,
        id: &CommandId,
        action: &str,
        timeout: Duration,
        on_progress: &mut impl FnMut(&Progress),
    ) -> Result<Response, ClientError> {
        let deadline = Instant::now() + timeout;
        let path = self.store.response_path(id);
        let mut delay = self.config.poll_floor;

        while Instant::now() < deadline {
            if path.exists() {
                thread::sleep(SETTLE_DELAY);
                match self.read_once(id, &path, on_progress) {
                    Ok(Polled::Terminal(resp)) => return Ok(resp),
                    Ok(Polled::KeepWaiting) => {}
                    Err(ClientError::MalformedResponse { .. }) => {
                        // Probably caught the file mid-write; one re-read
                        // after a pause, then give up on it.
                        thread::sleep(REPARSE_DELAY);
                        if let Polled::Terminal(resp) = self.read_once(id, &path, on_progress)? {
                            return Ok(resp);
                        }
                    }
                    Err(err) => return Err(err),
                }
            }

            thread::sleep(delay);
            delay = self.config.next_backoff(delay);
        }

        if !self.store.dir().exists() {
            return Err(ClientError::HostNotRunning {
                dir: self.store.dir().to_path_buf(),
            });
        }
        Err(ClientError::Timeout {
            id: id.clone(),
            action: action.to_string(),
            timeout,
        })
    }

    fn read_once(
        &self,
        id: &CommandId,
        path: &Path,
        on_progress: &mut impl FnMut(&Progress),
    ) -> Result<Polled, ClientError> {
        let raw = fs::read_to_string(path).map_err(|source| BridgeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let resp: Response =
            serde_json::from_str(&raw).map_err(|source| ClientError::MalformedResponse {
                path: path.to_path_buf(),
                source,
            })?;

        if resp.id != *id {
            // A response under our filename carrying someone else's id is
            // not ours to consume.
            warn!(expected = %id, got = %resp.id, "ignoring response with mismatched id");
            return Ok(Polled::KeepWaiting);
        }
        if resp.status == Status::Running {
            if let Some(progress) = &resp.progress {
                on_progress(progress);
            }
            return Ok(Polled::KeepWaiting);
        }
        Ok(Polled::Terminal(resp))
    }
}

/// One-time nudge when the store directory is first created in a
/// repository that does not ignore it.
fn gitignore_notice(dir: &Path) {
    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let ignored = fs::read_to_string(".gitignore")
        .map(|content| content.lines().any(|line| line.trim().trim_end_matches('/') == name))
        .unwrap_or(false);
    if !ignored {
        eprintln!("Note: add '{name}/' to your .gitignore to avoid committing bridge runtime files.");
    }
}
