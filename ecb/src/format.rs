//! Human-readable rendering of terminal responses, keyed by action.

use ecb_common::protocol::{LogKind, Response, Status};
use std::fmt::Write;

/// Render a terminal response for the action that produced it.
pub fn format_response(action: &str, resp: &Response) -> String {
    if resp.status == Status::Error {
        let message = resp.error.as_deref().unwrap_or("Unknown error");
        return format!("✗ Error: {message}");
    }

    let duration = resp.duration_ms as f64 / 1000.0;
    match action {
        "run-tests" => format_test_results(resp, duration),
        "compile" => format_compile_results(resp, duration),
        "get-console-logs" => format_console_logs(resp),
        "get-status" => format_editor_status(resp),
        "refresh" => format_refresh_results(resp, duration),
        "play" | "pause" | "step" => format_play_mode_result(resp, duration),
        _ => format_generic(resp, duration),
    }
}

fn format_test_results(resp: &Response, duration: f64) -> String {
    let empty = Default::default();
    let summary = resp.result.as_ref().unwrap_or(&empty);

    let mut out = format!(
        "✓ Tests Passed: {}\n✗ Tests Failed: {}\n○ Tests Skipped: {}\nDuration: {duration:.2}s",
        summary.passed, summary.failed, summary.skipped
    );

    if summary.failed > 0 && !summary.failures.is_empty() {
        out.push_str("\n\nFailed Tests:");
        for failure in &summary.failures {
            let _ = write!(out, "\n  - {}", failure.name);
            if !failure.message.is_empty() {
                let _ = write!(out, "\n    {}", failure.message);
            }
        }
    }
    out
}

fn format_compile_results(resp: &Response, duration: f64) -> String {
    match resp.status {
        Status::Success => format!("✓ Compilation Successful\nDuration: {duration:.2}s"),
        Status::Failure => match resp.error.as_deref() {
            Some(error) if !error.is_empty() => format!("✗ Compilation Failed\n\n{error}"),
            _ => format!("✗ Compilation Failed\nDuration: {duration:.2}s"),
        },
        _ => format!("Compilation Status: {:?}\nDuration: {duration:.2}s", resp.status),
    }
}

fn format_console_logs(resp: &Response) -> String {
    let logs = resp.console_logs.as_deref().unwrap_or_default();
    if logs.is_empty() {
        return "No console logs found".to_string();
    }

    let mut out = format!("Console Logs (last {}):\n", logs.len());
    for log in logs {
        let mut indicator = match log.kind {
            LogKind::Error => "[Error]".to_string(),
            LogKind::Warning => "[Warning]".to_string(),
            LogKind::Log => "[Log]".to_string(),
        };
        if log.count > 1 {
            let _ = write!(indicator, " (x{})", log.count);
        }
        let _ = write!(out, "\n{indicator} {}", log.message);
        for line in log.stack_trace.lines().filter(|l| !l.trim().is_empty()) {
            let _ = write!(out, "\n  {line}");
        }
        out.push('\n');
    }
    out
}

fn format_editor_status(resp: &Response) -> String {
    let Some(status) = &resp.editor_status else {
        return "Editor Status: Unknown (missing editorStatus field)".to_string();
    };

    let mut lines = vec!["Editor Status:".to_string()];
    lines.push(if status.is_compiling {
        "  - Compilation: ⏳ Compiling...".to_string()
    } else {
        "  - Compilation: ✓ Ready".to_string()
    });
    lines.push(if status.is_playing {
        if status.is_paused {
            "  - Play Mode: ⏸ Paused".to_string()
        } else {
            "  - Play Mode: ▶ Playing".to_string()
        }
    } else {
        "  - Play Mode: ✏ Editing".to_string()
    });
    lines.push(if status.is_updating {
        "  - Updating: ⏳ Yes".to_string()
    } else {
        "  - Updating: No".to_string()
    });
    lines.join("\n")
}

fn format_refresh_results(resp: &Response, duration: f64) -> String {
    match resp.status {
        Status::Success => format!("✓ Asset Database Refreshed\nDuration: {duration:.2}s"),
        Status::Failure => {
            let error = resp.error.as_deref().unwrap_or("Unknown error");
            format!("✗ Refresh Failed: {error}\nDuration: {duration:.2}s")
        }
        _ => format!("Refresh Status: {:?}\nDuration: {duration:.2}s", resp.status),
    }
}

fn format_play_mode_result(resp: &Response, duration: f64) -> String {
    match (&resp.status, &resp.editor_status) {
        (Status::Success, Some(editor)) => {
            let state = if editor.is_playing {
                if editor.is_paused { "⏸ Paused" } else { "▶ Playing" }
            } else {
                "⏹ Stopped"
            };
            format!(
                "✓ {} completed\nPlay Mode: {state}\nDuration: {duration:.2}s",
                resp.action
            )
        }
        (Status::Failure, _) => {
            let error = resp.error.as_deref().unwrap_or("Unknown error");
            format!("✗ {} failed: {error}\nDuration: {duration:.2}s", resp.action)
        }
        _ => format_generic(resp, duration),
    }
}

fn format_generic(resp: &Response, duration: f64) -> String {
    match resp.status {
        Status::Success => format!(
            "✓ {} completed successfully\nDuration: {duration:.2}s",
            resp.action
        ),
        Status::Failure => {
            let error = resp.error.as_deref().unwrap_or("Unknown error");
            format!("✗ {} failed: {error}\nDuration: {duration:.2}s", resp.action)
        }
        _ => format!("{} status: {:?}\nDuration: {duration:.2}s", resp.action, resp.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecb_common::id::CommandId;
    use ecb_common::protocol::{ConsoleEntry, EditorStatus, TestFailure, TestSummary};

    fn success(action: &str, duration_ms: u64) -> Response {
        Response::success(CommandId::mint(), action, duration_ms)
    }

    #[test]
    fn test_error_status_short_circuits_all_actions() {
        let resp = Response::error(CommandId::mint(), "run-tests", 10, "bridge busy");
        assert_eq!(format_response("run-tests", &resp), "✗ Error: bridge busy");
    }

    #[test]
    fn test_test_results_list_failures() {
        let resp = Response::failure(CommandId::mint(), "run-tests", 2500, "1 test(s) failed")
            .with_result(TestSummary {
                passed: 7,
                failed: 1,
                skipped: 2,
                failures: vec![TestFailure {
                    name: "Physics.RagdollSettles".to_string(),
                    message: "Expected rest within 2s".to_string(),
                }],
            });
        let out = format_response("run-tests", &resp);
        assert!(out.contains("✓ Tests Passed: 7"));
        assert!(out.contains("✗ Tests Failed: 1"));
        assert!(out.contains("○ Tests Skipped: 2"));
        assert!(out.contains("Duration: 2.50s"));
        assert!(out.contains("  - Physics.RagdollSettles"));
        assert!(out.contains("    Expected rest within 2s"));
    }

    #[test]
    fn test_console_logs_fold_counts_and_indent_traces() {
        let resp = success("get-console-logs", 5).with_console_logs(vec![
            ConsoleEntry {
                kind: LogKind::Error,
                message: "NullReferenceException".to_string(),
                stack_trace: "at Enemy.Update()\nat Scheduler.Step()".to_string(),
                count: 3,
            },
            ConsoleEntry {
                kind: LogKind::Log,
                message: "scene loaded".to_string(),
                stack_trace: String::new(),
                count: 1,
            },
        ]);
        let out = format_response("get-console-logs", &resp);
        assert!(out.contains("Console Logs (last 2):"));
        assert!(out.contains("[Error] (x3) NullReferenceException"));
        assert!(out.contains("  at Enemy.Update()"));
        assert!(out.contains("[Log] scene loaded"));
    }

    #[test]
    fn test_console_logs_empty() {
        let resp = success("get-console-logs", 5);
        assert_eq!(format_response("get-console-logs", &resp), "No console logs found");
    }

    #[test]
    fn test_editor_status_rendering() {
        let resp = success("get-status", 3).with_editor_status(EditorStatus {
            is_compiling: false,
            is_updating: false,
            is_playing: true,
            is_paused: true,
        });
        let out = format_response("get-status", &resp);
        assert!(out.contains("Compilation: ✓ Ready"));
        assert!(out.contains("Play Mode: ⏸ Paused"));
        assert!(out.contains("Updating: No"));
    }

    #[test]
    fn test_play_mode_stopped_state() {
        let resp = success("play", 120).with_editor_status(EditorStatus::default());
        let out = format_response("play", &resp);
        assert!(out.contains("✓ play completed"));
        assert!(out.contains("Play Mode: ⏹ Stopped"));
    }

    #[test]
    fn test_generic_fallback_for_unlisted_action() {
        let resp = success("ping", 40);
        let out = format_response("ping", &resp);
        assert!(out.contains("✓ ping completed successfully"));
        assert!(out.contains("Duration: 0.04s"));
    }
}
