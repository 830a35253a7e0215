//! Handler registry and the execute-with-callbacks contract.
//!
//! One action name maps to one [`Handler`]. The registry is built once at
//! host startup and never mutated afterward. Handlers receive a
//! [`CompletionHandle`](crate::dispatcher::CompletionHandle) and must call
//! `complete` exactly once, either synchronously before returning or from a
//! continuation on a later host tick. `progress` may be called zero or
//! more times, strictly before completion.

use crate::dispatcher::CompletionHandle;
use ecb_common::{Command, ConsoleEntry, EditorStatus, Response, Status, TestSummary};
use ecb_common::id::CommandId;
use std::collections::HashMap;
use std::sync::Arc;

/// Domain logic bound to one action name.
///
/// Returning `Err` without having completed degrades to a terminal `error`
/// response written by the dispatcher; the host process never crashes on a
/// failing handler.
pub trait Handler: Send + Sync {
    fn execute(&self, cmd: &Command, completion: CompletionHandle) -> anyhow::Result<()>;
}

/// Terminal outcome a handler passes to `CompletionHandle::complete`.
///
/// Every payload has its own typed field; `error` holds only the
/// error/failure message.
#[derive(Debug, Clone)]
pub struct Outcome {
    status: Status,
    error: Option<String>,
    result: Option<TestSummary>,
    editor_status: Option<EditorStatus>,
    console_logs: Option<Vec<ConsoleEntry>>,
}

impl Outcome {
    fn bare(status: Status) -> Self {
        Self {
            status,
            error: None,
            result: None,
            editor_status: None,
            console_logs: None,
        }
    }

    pub fn success() -> Self {
        Self::bare(Status::Success)
    }

    /// The action executed but produced a negative result (failing tests,
    /// failed build).
    pub fn failure(message: impl Into<String>) -> Self {
        let mut outcome = Self::bare(Status::Failure);
        outcome.error = Some(message.into());
        outcome
    }

    /// The action could not execute at all.
    pub fn error(message: impl Into<String>) -> Self {
        let mut outcome = Self::bare(Status::Error);
        outcome.error = Some(message.into());
        outcome
    }

    #[must_use]
    pub fn with_result(mut self, result: TestSummary) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn with_editor_status(mut self, status: EditorStatus) -> Self {
        self.editor_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_console_logs(mut self, logs: Vec<ConsoleEntry>) -> Self {
        self.console_logs = Some(logs);
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn into_response(
        self,
        id: CommandId,
        action: impl Into<String>,
        duration_ms: u64,
    ) -> Response {
        Response {
            id,
            status: self.status,
            action: action.into(),
            duration_ms,
            error: self.error,
            result: self.result,
            editor_status: self.editor_status,
            console_logs: self.console_logs,
            progress: None,
        }
    }
}

/// Immutable action-to-handler map built once at host startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an action name. Last registration wins; registration only
    /// happens during host construction.
    #[must_use]
    pub fn register(mut self, action: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(action.into(), handler);
        self
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(action).cloned()
    }

    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
