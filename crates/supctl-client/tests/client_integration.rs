//! End-to-end client tests against the mock daemon, over both transports.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use supctl_client::{ClientError, ProcessInfo, SupervisorClient};
use supctl_test_utils::MockDaemon;

fn socket_dir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("daemon.sock");
    (dir, socket)
}

fn sample_processes() -> Vec<ProcessInfo> {
    vec![
        ProcessInfo {
            name: "webapp".to_string(),
            group: "web".to_string(),
            description: "pid 4242, uptime 0:05:00".to_string(),
            state: 20,
            statename: "RUNNING".to_string(),
            pid: 4242,
            ..ProcessInfo::default()
        },
        ProcessInfo {
            name: "worker".to_string(),
            group: "jobs".to_string(),
            statename: "STOPPED".to_string(),
            ..ProcessInfo::default()
        },
    ]
}

#[test_log::test(tokio::test)]
async fn test_get_version_over_http() {
    let daemon = MockDaemon::builder().serve_http().await;
    let client = SupervisorClient::new(daemon.url());
    assert_eq!(client.get_version().await.unwrap(), "3.0");
}

#[test_log::test(tokio::test)]
async fn test_start_process_round_trip_over_unix() {
    let (_dir, socket) = socket_dir();
    let daemon = MockDaemon::builder().serve_unix(&socket).await;
    let client = SupervisorClient::new(daemon.url());
    assert!(client.change_process_state("start", "webapp").await.unwrap());
    assert_eq!(daemon.hits(), 1);
}

#[test_log::test(tokio::test)]
async fn test_get_all_process_info_decodes_records() {
    let daemon = MockDaemon::builder()
        .processes(sample_processes())
        .serve_http()
        .await;
    let client = SupervisorClient::new(daemon.url());

    let processes = client.get_all_process_info().await.unwrap();
    assert_eq!(processes, sample_processes());
    assert!(processes[0].is_running());
    assert!(!processes[1].is_running());
}

#[test_log::test(tokio::test)]
async fn test_invalid_state_change_never_reaches_the_wire() {
    let daemon = MockDaemon::builder().serve_http().await;
    let client = SupervisorClient::new(daemon.url());

    let err = client
        .change_process_state("restart", "webapp")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    let err = client.change_all_process_state("bounce").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    assert_eq!(daemon.hits(), 0);
}

#[test_log::test(tokio::test)]
async fn test_basic_auth_applies_on_http() {
    let daemon = MockDaemon::builder()
        .require_auth("alice", "sesame")
        .serve_http()
        .await;

    let mut client = SupervisorClient::new(daemon.url());
    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, ClientError::Status { ref status } if status.starts_with("401")));

    client.set_user("alice");
    client.set_password("sesame");
    assert_eq!(client.get_version().await.unwrap(), "3.0");
}

#[test_log::test(tokio::test)]
async fn test_basic_auth_applies_on_unix_socket() {
    let (_dir, socket) = socket_dir();
    let daemon = MockDaemon::builder()
        .require_auth("alice", "sesame")
        .serve_unix(&socket)
        .await;

    let mut client = SupervisorClient::new(daemon.url());
    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, ClientError::Status { ref status } if status.starts_with("401")));

    client.set_user("alice");
    client.set_password("sesame");
    assert_eq!(client.get_version().await.unwrap(), "3.0");
}

#[test_log::test(tokio::test)]
async fn test_server_error_status_is_a_protocol_failure() {
    let daemon = MockDaemon::builder().fail_status(500).serve_http().await;
    let client = SupervisorClient::new(daemon.url());

    let err = client.get_version().await.unwrap_err();
    match err {
        ClientError::Status { status } => assert_eq!(status, "500 Internal Server Error"),
        other => panic!("expected status error, got {other:?}"),
    }
}

/// Wait for the daemon to finish or abandon every in-flight request.
async fn wait_until_idle(daemon: &MockDaemon) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while daemon.in_flight() > 0 {
        assert!(
            Instant::now() < deadline,
            "daemon never released its in-flight requests"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[test_log::test(tokio::test)]
async fn test_timeout_unblocks_the_caller_over_http() {
    let daemon = MockDaemon::builder()
        .delay(Duration::from_secs(1))
        .serve_http()
        .await;
    let mut client = SupervisorClient::new(daemon.url());
    client.set_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
    // The caller is unblocked at the deadline, not at the server's pace.
    assert!(started.elapsed() < Duration::from_millis(500));

    // The abandoned exchange's connection is released and a fresh call
    // succeeds on the same client.
    wait_until_idle(&daemon).await;
    client.set_timeout(Duration::from_secs(10));
    assert_eq!(client.get_version().await.unwrap(), "3.0");
    assert_eq!(daemon.hits(), 2);
    assert_eq!(daemon.in_flight(), 0);
}

#[test_log::test(tokio::test)]
async fn test_timeout_unblocks_the_caller_over_unix_socket() {
    let (_dir, socket) = socket_dir();
    let daemon = MockDaemon::builder()
        .delay(Duration::from_secs(1))
        .serve_unix(&socket)
        .await;
    let mut client = SupervisorClient::new(daemon.url());
    client.set_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_millis(500));

    wait_until_idle(&daemon).await;
    client.set_timeout(Duration::from_secs(10));
    assert_eq!(client.get_version().await.unwrap(), "3.0");
    assert_eq!(daemon.hits(), 2);
    assert_eq!(daemon.in_flight(), 0);
}

#[test_log::test(tokio::test)]
async fn test_reload_config_reconstructs_groups_over_unix() {
    let (_dir, socket) = socket_dir();
    let daemon = MockDaemon::builder()
        .reload_groups(&["a", "b"], &[], &["c"])
        .serve_unix(&socket)
        .await;
    let client = SupervisorClient::new(daemon.url());

    let result = client.reload_config().await.unwrap();
    assert_eq!(result.added_group, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(result.changed_group, Vec::<String>::new());
    assert_eq!(result.removed_group, vec!["c".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_reload_config_fault_is_not_a_silent_success() {
    let daemon = MockDaemon::builder()
        .fault(6, "SHUTDOWN_STATE")
        .serve_http()
        .await;
    let client = SupervisorClient::new(daemon.url());

    let err = client.reload_config().await.unwrap_err();
    match err {
        ClientError::Fault { code, message } => {
            assert_eq!(code, 6);
            assert_eq!(message, "SHUTDOWN_STATE");
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn test_daemon_fault_surfaces_code_and_message() {
    let daemon = MockDaemon::builder()
        .fault(6, "SHUTDOWN_STATE")
        .serve_http()
        .await;
    let client = SupervisorClient::new(daemon.url());

    let err = client.shutdown().await.unwrap_err();
    match err {
        ClientError::Fault { code, message } => {
            assert_eq!(code, 6);
            assert_eq!(message, "SHUTDOWN_STATE");
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn test_signal_operations() {
    let daemon = MockDaemon::builder()
        .processes(sample_processes())
        .serve_http()
        .await;
    let client = SupervisorClient::new(daemon.url());

    assert!(client.signal_process("HUP", "webapp").await.unwrap());
    assert_eq!(client.signal_all_processes("TERM").await.unwrap().len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_change_all_process_state() {
    let daemon = MockDaemon::builder()
        .processes(sample_processes())
        .serve_http()
        .await;
    let client = SupervisorClient::new(daemon.url());

    let processes = client.change_all_process_state("stop").await.unwrap();
    assert_eq!(processes.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_unreachable_socket_is_a_connect_failure() {
    let client = SupervisorClient::new("unix:///tmp/no-such-supctl-daemon.sock");
    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}

#[test_log::test(tokio::test)]
async fn test_malformed_server_url_is_rejected() {
    let client = SupervisorClient::new("::not a url::");
    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, ClientError::BadUrl { .. }));
}
