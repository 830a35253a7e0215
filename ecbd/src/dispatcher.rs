//! The single-flight tick dispatcher.
//!
//! Runs inside the host's own cooperative scheduler: [`Dispatcher::tick`]
//! is called every tick and never blocks, spawns, or suspends. A tick
//! either no-ops, rejects a pending command, or hands off to a handler and
//! returns. Bookkeeping is keyed by command id and cleared only on the
//! terminal completion callback, so handlers may finish synchronously or
//! on a later tick without special-casing.

use crate::capability::{HostProbe, READ_ONLY_ACTIONS, is_read_only};
use crate::registry::{HandlerRegistry, Outcome};
use ecb_common::id::CommandId;
use ecb_common::protocol::{Command, CommandPeek, Progress, Response};
use ecb_common::store::FileStore;
use ecb_common::BridgeConfig;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Injected time source so stuck-command recovery is testable without
/// real waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// In-memory single-writer dispatcher state. Never persisted, never
/// crosses the process boundary.
#[derive(Debug, Default)]
struct DispatchState {
    current: Option<InFlight>,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: CommandId,
    started_at: Instant,
}

/// Host-side command dispatcher.
///
/// Guarantees at most one command in flight and exactly one terminal
/// response per accepted command. Every response write re-validates the id
/// and goes through scratch-file-plus-rename.
pub struct Dispatcher {
    store: FileStore,
    registry: HandlerRegistry,
    probe: Arc<dyn HostProbe>,
    clock: Arc<dyn Clock>,
    ceiling: Duration,
    state: Arc<Mutex<DispatchState>>,
}

impl Dispatcher {
    pub fn new(store: FileStore, registry: HandlerRegistry, probe: Arc<dyn HostProbe>) -> Self {
        Self {
            store,
            registry,
            probe,
            clock: Arc::new(SystemClock),
            ceiling: BridgeConfig::default().processing_ceiling,
            state: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn is_processing(&self) -> bool {
        self.lock().current.is_some()
    }

    pub fn current_id(&self) -> Option<CommandId> {
        self.lock().current.as_ref().map(|c| c.id.clone())
    }

    /// Startup sweep: a crashed prior session must not confuse a fresh
    /// run. Removes any leftover command file unconditionally plus stale
    /// response/scratch files past the TTL.
    pub fn startup_sweep(&self, response_ttl: Duration) {
        if self.store.remove_command() {
            warn!("removed leftover command file from a previous session");
        }
        let swept = self.store.sweep(response_ttl);
        if swept > 0 {
            info!(count = swept, "swept stale bridge files at startup");
        }
    }

    /// One scheduler tick. Cheap when idle; never blocks.
    pub fn tick(&self) {
        let now = self.clock.now();

        // Stuck-command recovery first, so a wedged handler cannot block
        // the bridge past the ceiling even before new input arrives.
        let in_flight = {
            let mut state = self.lock();
            match &state.current {
                Some(current) => {
                    let elapsed = now.saturating_duration_since(current.started_at);
                    if elapsed > self.ceiling {
                        warn!(
                            id = %current.id,
                            elapsed_secs = elapsed.as_secs(),
                            "in-flight command exceeded processing ceiling; resetting dispatcher state"
                        );
                        state.current = None;
                        None
                    } else {
                        Some(current.id.clone())
                    }
                }
                None => None,
            }
        };

        if !self.store.command_path().exists() {
            return;
        }

        // Single-flight gate: answer the waiting caller immediately
        // instead of leaving it polling until its deadline.
        if let Some(current_id) = in_flight {
            self.reject_pending(&format!("bridge busy with command {current_id}"));
            return;
        }

        // Transient host condition: only allow-listed read-only actions
        // may proceed, so mutating actions never race a host transition.
        if let Some(condition) = self.probe.busy() {
            let allowed = self
                .peek()
                .and_then(|p| p.action)
                .is_some_and(|a| is_read_only(&a));
            if !allowed {
                self.reject_pending(&format!(
                    "host is busy ({condition}); safe actions while busy: {}",
                    READ_ONLY_ACTIONS.join(", ")
                ));
                return;
            }
        }

        let raw = match fs::read_to_string(self.store.command_path()) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to read command file; retrying next tick");
                return;
            }
        };

        let cmd = match serde_json::from_str::<Command>(&raw) {
            Ok(cmd) if !cmd.action.is_empty() => cmd,
            Ok(_) | Err(_) => {
                // Never echo an unvalidated id into a path: the
                // synthesized error carries a freshly minted id.
                self.store.remove_command();
                let action = serde_json::from_str::<CommandPeek>(&raw)
                    .ok()
                    .and_then(|p| p.action)
                    .unwrap_or_else(|| "unknown".to_string());
                self.write_response(&Response::error(
                    CommandId::mint(),
                    action,
                    0,
                    "malformed command: missing or invalid id/action",
                ));
                return;
            }
        };

        // Consume the file before execution so the command is dispatched
        // at most once.
        self.store.remove_command();
        {
            let mut state = self.lock();
            state.current = Some(InFlight {
                id: cmd.id.clone(),
                started_at: now,
            });
        }

        let completion = CompletionHandle::new(
            cmd.id.clone(),
            cmd.action.clone(),
            now,
            Arc::clone(&self.state),
            self.store.clone(),
            Arc::clone(&self.clock),
        );

        let Some(handler) = self.registry.get(&cmd.action) else {
            completion.complete(Outcome::error(format!("unknown action: {}", cmd.action)));
            return;
        };

        debug!(id = %cmd.id, action = %cmd.action, "dispatching command");
        if let Err(err) = handler.execute(&cmd, completion.clone()) {
            error!(id = %cmd.id, action = %cmd.action, error = %err, "handler failed");
            if !completion.is_completed() {
                completion.complete(Outcome::error(format!("handler failed: {err}")));
            }
        }
    }

    /// Delete the pending command file and, when its id is valid, answer
    /// it with a terminal `error` carrying `reason`. A file without a
    /// valid id is dropped silently; no response path is ever built from
    /// an unvalidated id.
    fn reject_pending(&self, reason: &str) {
        let peek = self.peek();
        self.store.remove_command();

        let action = peek
            .as_ref()
            .and_then(|p| p.action.clone())
            .unwrap_or_else(|| "unknown".to_string());
        match peek.and_then(|p| p.id).map(|raw| CommandId::parse(&raw)) {
            Some(Ok(id)) => {
                debug!(%id, reason, "rejecting pending command");
                self.write_response(&Response::error(id, action, 0, reason));
            }
            _ => warn!("dropped pending command without a valid id; no response written"),
        }
    }

    fn peek(&self) -> Option<CommandPeek> {
        let raw = fs::read_to_string(self.store.command_path()).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn write_response(&self, resp: &Response) {
        if let Err(err) = self.store.write_response(resp) {
            warn!(id = %resp.id, error = %err, "failed to write response");
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completion callbacks handed to a handler.
///
/// `progress` publishes zero-or-more `running` updates; `complete`
/// publishes the terminal response exactly once and releases the
/// dispatcher. Cloneable so an asynchronous handler can move it into a
/// continuation and finish on a later tick.
#[derive(Clone)]
pub struct CompletionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: CommandId,
    action: String,
    started_at: Instant,
    completed: AtomicBool,
    state: Arc<Mutex<DispatchState>>,
    store: FileStore,
    clock: Arc<dyn Clock>,
}

impl CompletionHandle {
    fn new(
        id: CommandId,
        action: String,
        started_at: Instant,
        state: Arc<Mutex<DispatchState>>,
        store: FileStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                action,
                started_at,
                completed: AtomicBool::new(false),
                state,
                store,
                clock,
            }),
        }
    }

    pub fn id(&self) -> &CommandId {
        &self.inner.id
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> u64 {
        self.inner
            .clock
            .now()
            .saturating_duration_since(self.inner.started_at)
            .as_millis() as u64
    }

    /// Publish a non-terminal `running` update, replacing this id's
    /// response file. Ignored after completion.
    pub fn progress(&self, progress: Progress) {
        if self.is_completed() {
            warn!(id = %self.inner.id, "progress after completion ignored");
            return;
        }
        let resp = Response::running(
            self.inner.id.clone(),
            self.inner.action.clone(),
            self.duration_ms(),
            progress,
        );
        if let Err(err) = self.inner.store.write_response(&resp) {
            warn!(id = %self.inner.id, error = %err, "failed to write progress response");
        }
    }

    /// Publish the terminal response and clear dispatcher state. The
    /// first call wins; duplicates are ignored with a warning.
    pub fn complete(&self, outcome: Outcome) {
        if self.inner.completed.swap(true, Ordering::SeqCst) {
            warn!(id = %self.inner.id, "duplicate completion ignored");
            return;
        }

        let resp = outcome.into_response(
            self.inner.id.clone(),
            self.inner.action.clone(),
            self.duration_ms(),
        );
        if let Err(err) = self.inner.store.write_response(&resp) {
            warn!(id = %self.inner.id, error = %err, "failed to write terminal response");
        }

        // Release only if we are still the in-flight command; a ceiling
        // reset may have moved the dispatcher on without us.
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.current.as_ref().is_some_and(|c| c.id == self.inner.id) {
            state.current = None;
        }
    }
}
