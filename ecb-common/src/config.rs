//! Bridge configuration defaults.
//!
//! Both sides share these knobs; binaries override them via clap flags and
//! `ECB_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Default store directory name, created under the project root.
pub const DEFAULT_DIR_NAME: &str = ".editor-bridge";

/// Default controller submit timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds for the `get-console-logs` limit parameter.
pub const MIN_LOG_LIMIT: u32 = 1;
pub const MAX_LOG_LIMIT: u32 = 1000;

/// Shared timing and layout knobs for one bridge instance
/// (one store directory = one host).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Store directory shared by controller and host.
    pub dir: PathBuf,
    /// Age past which response/scratch files are swept.
    pub response_ttl: Duration,
    /// Poll backoff floor.
    pub poll_floor: Duration,
    /// Poll backoff cap.
    pub poll_cap: Duration,
    /// Backoff growth factor per empty poll.
    pub poll_multiplier: f64,
    /// Host-side ceiling on a single in-flight command before the
    /// dispatcher force-resets its state.
    pub processing_ceiling: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR_NAME),
            response_ttl: Duration::from_secs(3600),
            poll_floor: Duration::from_millis(100),
            poll_cap: Duration::from_secs(1),
            poll_multiplier: 1.5,
            processing_ceiling: Duration::from_secs(300),
        }
    }
}

impl BridgeConfig {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Next backoff delay after `current`, clamped to the cap.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let scaled = current.mul_f64(self.poll_multiplier);
        scaled.min(self.poll_cap)
    }
}
