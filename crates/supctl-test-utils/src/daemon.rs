//! Mock supervision daemon.
//!
//! Serves the `/RPC2` endpoint over a Unix socket or a loopback TCP port
//! with canned replies, so client tests can exercise both transports without
//! a real daemon. Behavior knobs cover the failure paths: reply delay,
//! forced non-success status, fault replies, and basic-auth enforcement.
//! A request counter supports "no I/O happened" assertions.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;
use tracing::debug;

use supctl_client::xmlrpc::{encode_fault, encode_response, Value};
use supctl_types::ProcessInfo;

/// Behavior knobs for a [`MockDaemon`].
#[derive(Default)]
pub struct MockDaemonBuilder {
    delay: Option<Duration>,
    fail_status: Option<StatusCode>,
    fault: Option<(i64, String)>,
    credentials: Option<(String, String)>,
    processes: Vec<ProcessInfo>,
    reload_groups: [Vec<String>; 3],
}

impl MockDaemonBuilder {
    /// Sleep this long before answering each request.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer every request with this HTTP status and no reply document.
    pub fn fail_status(mut self, status: u16) -> Self {
        self.fail_status = Some(StatusCode::from_u16(status).expect("valid status code"));
        self
    }

    /// Answer every request with an RPC fault.
    pub fn fault(mut self, code: i64, message: &str) -> Self {
        self.fault = Some((code, message.to_string()));
        self
    }

    /// Reject requests that do not carry these basic-auth credentials.
    pub fn require_auth(mut self, user: &str, password: &str) -> Self {
        self.credentials = Some((user.to_string(), password.to_string()));
        self
    }

    /// Process records returned by `getAllProcessInfo` and the all-process
    /// operations.
    pub fn processes(mut self, processes: Vec<ProcessInfo>) -> Self {
        self.processes = processes;
        self
    }

    /// Group names returned by `reloadConfig`, in added/changed/removed
    /// order.
    pub fn reload_groups(mut self, added: &[&str], changed: &[&str], removed: &[&str]) -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        self.reload_groups = [owned(added), owned(changed), owned(removed)];
        self
    }

    fn into_state(self) -> Arc<MockState> {
        Arc::new(MockState {
            hits: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            delay: self.delay,
            fail_status: self.fail_status,
            fault: self.fault,
            auth_token: self
                .credentials
                .map(|(user, password)| format!("Basic {}", BASE64.encode(format!("{user}:{password}")))),
            processes: self.processes,
            reload_groups: self.reload_groups,
        })
    }

    /// Bind a Unix socket at `socket_path` and serve until dropped.
    pub async fn serve_unix(self, socket_path: &Path) -> MockDaemon {
        let state = self.into_state();
        let listener = UnixListener::bind(socket_path).expect("bind mock daemon socket");
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        MockDaemon {
            url: format!("unix://{}", socket_path.display()),
            state,
            task,
        }
    }

    /// Bind an ephemeral loopback TCP port and serve until dropped.
    pub async fn serve_http(self) -> MockDaemon {
        let state = self.into_state();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock daemon port");
        let addr = listener.local_addr().expect("mock daemon local addr");
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        MockDaemon {
            url: format!("http://{addr}"),
            state,
            task,
        }
    }
}

/// A running mock daemon. Stops serving when dropped.
pub struct MockDaemon {
    url: String,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockDaemon {
    pub fn builder() -> MockDaemonBuilder {
        MockDaemonBuilder::default()
    }

    /// Server URL in the form the client expects (`http://…` or `unix://…`).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of RPC requests that reached the daemon.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Number of requests currently being served. Returns to zero once every
    /// exchange has completed or been abandoned by a disconnecting client.
    pub fn in_flight(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct MockState {
    hits: AtomicUsize,
    open: AtomicUsize,
    delay: Option<Duration>,
    fail_status: Option<StatusCode>,
    fault: Option<(i64, String)>,
    auth_token: Option<String>,
    processes: Vec<ProcessInfo>,
    reload_groups: [Vec<String>; 3],
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/RPC2", post(handle_rpc))
        .with_state(state)
}

/// Holds the in-flight gauge up; decrements whether the handler completes
/// or its future is dropped because the client went away.
struct RequestGuard(Arc<MockState>);

impl RequestGuard {
    fn new(state: Arc<MockState>) -> Self {
        state.open.fetch_add(1, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_rpc(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let _guard = RequestGuard::new(state.clone());

    if let Some(expected) = &state.auth_token {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
        }
    }

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    if let Some(status) = state.fail_status {
        return (status, "forced failure").into_response();
    }

    let method = method_name(&body).unwrap_or_default();
    debug!(method, "mock daemon handling call");

    let reply = if let Some((code, message)) = &state.fault {
        encode_fault(*code, message)
    } else {
        dispatch(&state, &method)
    };
    ([(header::CONTENT_TYPE, "text/xml")], reply).into_response()
}

fn method_name(body: &str) -> Option<String> {
    let start = body.find("<methodName>")? + "<methodName>".len();
    let end = body[start..].find("</methodName>")? + start;
    Some(body[start..end].to_string())
}

fn dispatch(state: &MockState, method: &str) -> Vec<u8> {
    match method {
        "supervisor.getVersion" => encode_response(&Value::String("3.0".to_string())),
        "supervisor.getAllProcessInfo"
        | "supervisor.startAllProcesses"
        | "supervisor.stopAllProcesses"
        | "supervisor.signalAllProcesses" => encode_response(&process_list(&state.processes)),
        "supervisor.startProcess"
        | "supervisor.stopProcess"
        | "supervisor.signalProcess"
        | "supervisor.shutdown" => encode_response(&Value::Bool(true)),
        "supervisor.reloadConfig" => encode_response(&reload_value(&state.reload_groups)),
        _ => encode_fault(1, &format!("unknown method {method}")),
    }
}

fn process_list(processes: &[ProcessInfo]) -> Value {
    Value::Array(processes.iter().map(process_value).collect())
}

fn process_value(info: &ProcessInfo) -> Value {
    let string = |s: &str| Value::String(s.to_string());
    Value::Struct(vec![
        ("name".to_string(), string(&info.name)),
        ("group".to_string(), string(&info.group)),
        ("description".to_string(), string(&info.description)),
        ("start".to_string(), Value::Int(info.start)),
        ("stop".to_string(), Value::Int(info.stop)),
        ("now".to_string(), Value::Int(info.now)),
        ("state".to_string(), Value::Int(info.state)),
        ("statename".to_string(), string(&info.statename)),
        ("spawnerr".to_string(), string(&info.spawnerr)),
        ("exitstatus".to_string(), Value::Int(info.exitstatus)),
        ("logfile".to_string(), string(&info.logfile)),
        ("stdout_logfile".to_string(), string(&info.stdout_logfile)),
        ("stderr_logfile".to_string(), string(&info.stderr_logfile)),
        ("pid".to_string(), Value::Int(info.pid)),
    ])
}

fn reload_value(groups: &[Vec<String>; 3]) -> Value {
    Value::Array(
        groups
            .iter()
            .map(|group| {
                Value::Array(
                    group
                        .iter()
                        .map(|name| Value::String(name.clone()))
                        .collect(),
                )
            })
            .collect(),
    )
}
