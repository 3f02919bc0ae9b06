//! Transport resolver: delivers one encoded call and returns the validated
//! response body.
//!
//! The server URL scheme picks the transport: `http`/`https` goes through
//! `reqwest`, `unix` speaks HTTP/1.1 directly over a Unix domain socket via
//! a `hyper` client handshake. Above this module both look identical:
//! `post()` either yields a fully-read body that already passed status
//! validation, or one [`ClientError`]. Connections are per-call on the
//! socket path; nothing is pooled or retried here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Fixed RPC endpoint path on the daemon.
const RPC_PATH: &str = "/RPC2";

/// Basic-auth credentials, attached identically on both transports.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Credentials<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

enum Target {
    Http(String),
    Unix(PathBuf),
}

fn resolve(server_url: &str) -> Result<Target, ClientError> {
    let url = reqwest::Url::parse(server_url).map_err(|err| ClientError::BadUrl {
        url: server_url.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(Target::Http(format!(
            "{}{RPC_PATH}",
            server_url.trim_end_matches('/')
        ))),
        // Only the filesystem path component matters for a socket URL.
        "unix" => Ok(Target::Unix(PathBuf::from(url.path()))),
        other => Err(ClientError::BadUrl {
            url: server_url.to_string(),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

/// Submit one request and return the response body.
///
/// A configured timeout bounds the entire request lifetime; exceeding it
/// aborts the in-flight exchange and releases the connection.
pub(crate) async fn post(
    http: &reqwest::Client,
    server_url: &str,
    body: Vec<u8>,
    auth: Option<Credentials<'_>>,
    timeout: Option<Duration>,
) -> Result<Bytes, ClientError> {
    match resolve(server_url)? {
        Target::Http(endpoint) => post_http(http, &endpoint, body, auth, timeout).await,
        Target::Unix(path) => post_unix(&path, body, auth, timeout).await,
    }
}

/// Any status class other than success is a protocol failure; the caller
/// must drop the response before surfacing it.
fn check_status(status: StatusCode) -> Result<(), ClientError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ClientError::Status {
            status: status.to_string(),
        })
    }
}

async fn post_http(
    http: &reqwest::Client,
    endpoint: &str,
    body: Vec<u8>,
    auth: Option<Credentials<'_>>,
    timeout: Option<Duration>,
) -> Result<Bytes, ClientError> {
    debug!(endpoint, "dispatching RPC over HTTP");

    let mut request = http
        .post(endpoint)
        .header(header::CONTENT_TYPE, "text/xml")
        .body(body);
    if let Some(creds) = auth {
        request = request.basic_auth(creds.user, Some(creds.password));
    }
    if let Some(t) = timeout {
        request = request.timeout(t);
    }

    let response = request
        .send()
        .await
        .map_err(|err| classify_reqwest(err, timeout))?;

    if let Err(err) = check_status(response.status()) {
        // Dropping the response releases the connection before the
        // failure is surfaced.
        drop(response);
        return Err(err);
    }

    response
        .bytes()
        .await
        .map_err(|err| classify_reqwest(err, timeout))
}

fn classify_reqwest(err: reqwest::Error, timeout: Option<Duration>) -> ClientError {
    match timeout {
        Some(t) if err.is_timeout() => ClientError::Timeout(t),
        _ => ClientError::Transport(err.to_string()),
    }
}

async fn post_unix(
    socket: &Path,
    body: Vec<u8>,
    auth: Option<Credentials<'_>>,
    timeout: Option<Duration>,
) -> Result<Bytes, ClientError> {
    debug!(socket = %socket.display(), "dispatching RPC over Unix socket");

    // The timeout applies to connection establishment and, separately, as a
    // deadline on the whole request/read exchange.
    let connect = UnixStream::connect(socket);
    let stream = match timeout {
        Some(t) => tokio::time::timeout(t, connect)
            .await
            .map_err(|_| ClientError::Timeout(t))?,
        None => connect.await,
    }
    .map_err(|source| ClientError::Connect {
        target: socket.display().to_string(),
        source,
    })?;

    let io = TokioIo::new(stream);
    let exchange = async move {
        let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
            .await
            .map_err(|err| ClientError::Transport(format!("HTTP handshake failed: {err}")))?;

        // Drive the connection until the exchange completes or is dropped.
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                warn!(error = %err, "socket connection error");
            }
        });

        let mut builder = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(RPC_PATH)
            .header(header::HOST, "localhost")
            .header(header::CONTENT_TYPE, "text/xml");
        if let Some(creds) = auth {
            let token = BASE64.encode(format!("{}:{}", creds.user, creds.password));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {token}"));
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|err| ClientError::Transport(format!("failed to build request: {err}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|err| ClientError::Transport(format!("request failed: {err}")))?;

        if let Err(err) = check_status(response.status()) {
            // Body dropped unread; the connection task winds down with it.
            drop(response);
            return Err(err);
        }

        response
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|err| ClientError::Transport(format!("failed to read response body: {err}")))
    };

    match timeout {
        // Dropping the exchange future on expiry closes the connection.
        Some(t) => tokio::time::timeout(t, exchange)
            .await
            .map_err(|_| ClientError::Timeout(t))?,
        None => exchange.await,
    }
}
