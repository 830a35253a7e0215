//! Bridge wire protocol definitions.
//!
//! Defines the JSON structures exchanged through the file store: one
//! `command.json` written by the controller, one `response-{id}.json`
//! written (and possibly rewritten with progress) by the host. Field names
//! follow the host-side JSON conventions (`duration_ms`, `editorStatus`,
//! `consoleLogs`, ...), so renames here are load-bearing.

use crate::id::CommandId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A requested action with parameters, written by the controller.
///
/// Params are string-to-string: the host-side JSON utility only handles
/// string values, so numeric parameters (e.g. `limit`) travel as decimal
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Command {
    pub fn new(action: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        Self {
            id: CommandId::mint(),
            action: action.into(),
            params,
        }
    }
}

/// A lenient view of a command file used to peek id/action without
/// committing to a full parse. Missing or malformed fields surface as
/// `None` rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandPeek {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// Response status. `running` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Non-terminal progress update; the same response file will be
    /// rewritten until a terminal status lands.
    Running,
    /// The action fully succeeded.
    Success,
    /// The action executed but produced a negative outcome (failing tests,
    /// failed compile).
    Failure,
    /// The action could not execute at all (bad input, busy host, unknown
    /// action, internal fault).
    Error,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One failed test inside a [`TestSummary`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFailure {
    pub name: String,
    #[serde(default)]
    pub message: String,
}

/// Test-run payload for `run-tests` responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSummary {
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub failures: Vec<TestFailure>,
}

/// Editor state payload for `get-status` and play-mode responses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorStatus {
    #[serde(default)]
    pub is_compiling: bool,
    #[serde(default)]
    pub is_updating: bool,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub is_paused: bool,
}

/// Console entry severity. Serialized capitalized (`Log`, `Warning`,
/// `Error`) to match the host console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Log,
    Warning,
    Error,
}

impl Default for LogKind {
    fn default() -> Self {
        Self::Log
    }
}

/// One console entry in a `get-console-logs` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    #[serde(rename = "type", default)]
    pub kind: LogKind,
    pub message: String,
    #[serde(
        rename = "stackTrace",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub stack_trace: String,
    /// Collapsed duplicate count; 1 for a unique entry.
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// Progress payload attached to `running` responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(
        rename = "currentTest",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub current_test: String,
}

/// The (possibly progressive) answer to a command.
///
/// Exactly one terminal response is written per command id; `running`
/// responses replace the same file via atomic rename as progress arrives.
/// Every payload has its own typed field; `error` carries only the
/// error/failure message, never structured data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: CommandId,
    pub status: Status,
    pub action: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TestSummary>,
    #[serde(
        rename = "editorStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub editor_status: Option<EditorStatus>,
    #[serde(
        rename = "consoleLogs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub console_logs: Option<Vec<ConsoleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl Response {
    fn bare(id: CommandId, status: Status, action: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id,
            status,
            action: action.into(),
            duration_ms,
            error: None,
            result: None,
            editor_status: None,
            console_logs: None,
            progress: None,
        }
    }

    pub fn success(id: CommandId, action: impl Into<String>, duration_ms: u64) -> Self {
        Self::bare(id, Status::Success, action, duration_ms)
    }

    pub fn failure(
        id: CommandId,
        action: impl Into<String>,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        let mut resp = Self::bare(id, Status::Failure, action, duration_ms);
        resp.error = Some(message.into());
        resp
    }

    pub fn error(
        id: CommandId,
        action: impl Into<String>,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        let mut resp = Self::bare(id, Status::Error, action, duration_ms);
        resp.error = Some(message.into());
        resp
    }

    pub fn running(
        id: CommandId,
        action: impl Into<String>,
        duration_ms: u64,
        progress: Progress,
    ) -> Self {
        let mut resp = Self::bare(id, Status::Running, action, duration_ms);
        resp.progress = Some(progress);
        resp
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let json = r#"{
            "id": "a1b2c3d4-e5f6-7890-abcd-ef0123456789",
            "action": "run-tests",
            "params": {"testMode": "EditMode", "filter": "MyTests"}
        }"#;

        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.action, "run-tests");
        assert_eq!(cmd.params.get("testMode").map(String::as_str), Some("EditMode"));
    }

    #[test]
    fn test_parse_command_without_params() {
        let json = r#"{"id": "a1b2c3d4-e5f6-7890-abcd-ef0123456789", "action": "compile"}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(cmd.params.is_empty());
    }

    #[test]
    fn test_parse_command_rejects_bad_id() {
        let json = r#"{"id": "../../escape", "action": "compile", "params": {}}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }

    #[test]
    fn test_peek_tolerates_missing_fields() {
        let peek: CommandPeek = serde_json::from_str(r#"{"action": "compile"}"#).unwrap();
        assert!(peek.id.is_none());
        assert_eq!(peek.action.as_deref(), Some("compile"));

        let peek: CommandPeek = serde_json::from_str("{}").unwrap();
        assert!(peek.action.is_none());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&Status::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&Status::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&Status::Failure).unwrap(), "\"failure\"");
        assert_eq!(serde_json::to_string(&Status::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!Status::Running.is_terminal());
        assert!(Status::Success.is_terminal());
        assert!(Status::Failure.is_terminal());
        assert!(Status::Error.is_terminal());
    }

    #[test]
    fn test_response_wire_field_names() {
        let id = CommandId::mint();
        let resp = Response::success(id, "get-status", 12)
            .with_editor_status(EditorStatus {
                is_compiling: true,
                ..Default::default()
            });
        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.contains("\"duration_ms\":12"));
        assert!(json.contains("\"editorStatus\""));
        assert!(json.contains("\"isCompiling\":true"));
        // Unused payload fields are omitted entirely.
        assert!(!json.contains("consoleLogs"));
        assert!(!json.contains("\"error\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_console_entry_wire_names() {
        let entry = ConsoleEntry {
            kind: LogKind::Warning,
            message: "deprecated API".to_string(),
            stack_trace: "at Foo.Bar()".to_string(),
            count: 3,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"Warning\""));
        assert!(json.contains("\"stackTrace\""));
        assert!(json.contains("\"count\":3"));
    }

    #[test]
    fn test_console_entry_defaults_on_parse() {
        let entry: ConsoleEntry = serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert_eq!(entry.kind, LogKind::Log);
        assert_eq!(entry.count, 1);
        assert!(entry.stack_trace.is_empty());
    }

    #[test]
    fn test_running_response_carries_progress() {
        let id = CommandId::mint();
        let resp = Response::running(
            id.clone(),
            "run-tests",
            500,
            Progress {
                current: 2,
                total: 10,
                current_test: "Tests.Move".to_string(),
            },
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"currentTest\":\"Tests.Move\""));

        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, id);
        assert_eq!(back.status, Status::Running);
        assert_eq!(back.progress.unwrap().total, 10);
    }

    #[test]
    fn test_failure_response_with_test_summary() {
        let resp = Response::failure(CommandId::mint(), "run-tests", 2000, "1 test failed")
            .with_result(TestSummary {
                passed: 7,
                failed: 1,
                skipped: 0,
                failures: vec![TestFailure {
                    name: "Tests.Jump".to_string(),
                    message: "expected 3, got 2".to_string(),
                }],
            });

        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        let summary = back.result.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].name, "Tests.Jump");
    }
}
