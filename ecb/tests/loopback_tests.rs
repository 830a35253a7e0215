//! End-to-end exchanges: real client, real store, loopback host ticking
//! in a background thread.

mod common;

use common::TickingHost;
use ecb::{BridgeClient, ClientError, EXIT_TIMEOUT};
use ecb_common::BridgeConfig;
use ecb_common::protocol::{LogKind, Status};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn client_for(host: &TickingHost) -> BridgeClient {
    BridgeClient::new(BridgeConfig::default().with_dir(host.store.dir()))
}

#[test]
fn test_get_status_round_trip() {
    let host = TickingHost::start();
    let client = client_for(&host);

    let resp = client
        .submit("get-status", BTreeMap::new(), TIMEOUT)
        .unwrap();
    assert_eq!(resp.status, Status::Success);
    let editor = resp.editor_status.unwrap();
    assert!(!editor.is_playing);
    // Consumed response left nothing behind.
    assert!(!host.store.response_path(&resp.id).exists());
    assert!(!host.store.command_path().exists());
}

#[test]
fn test_run_tests_streams_progress_then_failure() {
    let host = TickingHost::start();
    let client = client_for(&host);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let resp = client
        .submit_with_progress("run-tests", BTreeMap::new(), TIMEOUT, move |p| {
            sink.lock().unwrap().push(p.current_test.clone());
        })
        .unwrap();

    assert_eq!(resp.status, Status::Failure);
    let summary = resp.result.unwrap();
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 1);
    // Progress may or may not be observed depending on poll timing, but
    // anything observed must be a real test name.
    for name in seen.lock().unwrap().iter() {
        assert!(name.starts_with("Loopback."));
    }
}

#[test]
fn test_run_tests_filter_param_reaches_host() {
    let host = TickingHost::start();
    let client = client_for(&host);

    let mut params = BTreeMap::new();
    params.insert("filter".to_string(), "Smoke".to_string());
    let resp = client.submit("run-tests", params, TIMEOUT).unwrap();
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.result.unwrap().passed, 2);
}

#[test]
fn test_console_logs_round_trip_with_filter() {
    let host = TickingHost::start();
    let client = client_for(&host);

    host.host.console().push(LogKind::Error, "boom", "at X()");
    host.host.console().push(LogKind::Log, "quiet", "");

    let mut params = BTreeMap::new();
    params.insert("filter".to_string(), "error".to_string());
    let resp = client.submit("get-console-logs", params, TIMEOUT).unwrap();
    let logs = resp.console_logs.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "boom");
}

#[test]
fn test_busy_host_rejects_compile_but_serves_status() {
    let host = TickingHost::start();
    let client = client_for(&host);
    host.host.probe().set_busy("compiling scripts");

    let resp = client.submit("compile", BTreeMap::new(), TIMEOUT).unwrap();
    assert_eq!(resp.status, Status::Error);
    let message = resp.error.unwrap();
    assert!(message.contains("compiling scripts"));
    assert!(message.contains("get-status"));

    let resp = client
        .submit("get-status", BTreeMap::new(), TIMEOUT)
        .unwrap();
    assert_eq!(resp.status, Status::Success);
}

#[test]
fn test_unknown_action_is_an_error_not_a_timeout() {
    let host = TickingHost::start();
    let client = client_for(&host);

    let resp = client.submit("teleport", BTreeMap::new(), TIMEOUT).unwrap();
    assert_eq!(resp.status, Status::Error);
    assert!(resp.error.unwrap().contains("unknown action"));
}

#[test]
fn test_no_host_times_out_with_exit_code_2() {
    // No ticking host at all; just a directory.
    let tmp = tempfile::TempDir::new().unwrap();
    let client = BridgeClient::new(BridgeConfig::default().with_dir(tmp.path().join("bridge")));

    let err = client
        .submit("get-status", BTreeMap::new(), Duration::from_millis(400))
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }));
    assert_eq!(err.exit_code(), EXIT_TIMEOUT);
}

#[test]
fn test_sequential_commands_share_one_store() {
    let host = TickingHost::start();
    let client = client_for(&host);

    for _ in 0..3 {
        let resp = client.submit("ping", BTreeMap::new(), TIMEOUT).unwrap();
        assert_eq!(resp.status, Status::Success);
    }
    // Each exchange cleaned up after itself.
    let leftovers = std::fs::read_dir(host.store.dir())
        .unwrap()
        .flatten()
        .count();
    assert_eq!(leftovers, 0);
}
