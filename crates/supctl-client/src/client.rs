//! Typed client for the daemon's RPC method set.
//!
//! One [`SupervisorClient`] per daemon; each operation builds its own
//! request, resolves the transport, validates the status class, and decodes
//! the reply, either through the generic [`crate::xmlrpc`] value decoder or,
//! for `reloadConfig`, through the positional [`crate::stream`] processor.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use hyper::body::Bytes;
use tracing::debug;
use zeroize::Zeroizing;

use supctl_types::{ProcessInfo, ReloadConfigResult};

use crate::error::ClientError;
use crate::stream::PathProcessor;
use crate::transport::{self, Credentials};
use crate::xmlrpc::{self, FromValue, Value, XmlRpcError};

/// The two process-state-change verbs the daemon understands.
const STATE_CHANGES: [&str; 2] = ["start", "stop"];

/// Structural path of each group container in a `reloadConfig` reply.
const RELOAD_GROUP_PATH: &str =
    "methodResponse/params/param/value/array/data/value/array/data";
/// Structural path of each group name inside a group container.
const RELOAD_NAME_PATH: &str =
    "methodResponse/params/param/value/array/data/value/array/data/value/string";
/// Structural path of a fault reply's root element.
const RELOAD_FAULT_PATH: &str = "methodResponse/fault";

/// Client for a supervisord-compatible daemon's XML-RPC control interface.
///
/// The target is either a network URL (`http://…`, `https://…`) or a local
/// domain socket (`unix:///path/to/daemon.sock`). Configuration is read per
/// call; setters may be used between requests.
pub struct SupervisorClient {
    server_url: String,
    user: String,
    password: Zeroizing<String>,
    timeout: Option<Duration>,
    http: reqwest::Client,
}

impl SupervisorClient {
    /// Create a client for the given server URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            user: String::new(),
            password: Zeroizing::new(String::new()),
            timeout: None,
            http: reqwest::Client::new(),
        }
    }

    /// Set the basic-auth user name.
    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = user.into();
    }

    /// Set the basic-auth password. Held in zeroizing storage.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Zeroizing::new(password.into());
    }

    /// Bound the entire lifetime of each subsequent request.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    // Credentials are attached only when both parts are non-empty.
    fn credentials(&self) -> Option<Credentials<'_>> {
        if self.user.is_empty() || self.password.is_empty() {
            None
        } else {
            Some(Credentials {
                user: &self.user,
                password: &self.password,
            })
        }
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Bytes, ClientError> {
        debug!(method, url = %self.server_url, "invoking daemon method");
        let body = xmlrpc::encode_call(method, params);
        transport::post(
            &self.http,
            &self.server_url,
            body,
            self.credentials(),
            self.timeout,
        )
        .await
    }

    async fn call_decoded<T: FromValue>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<T, ClientError> {
        let body = self.call(method, params).await?;
        let value = xmlrpc::decode_reply(&body)?;
        Ok(T::from_value(value)?)
    }

    /// Daemon version string.
    pub async fn get_version(&self) -> Result<String, ClientError> {
        self.call_decoded("supervisor.getVersion", &[]).await
    }

    /// All managed processes and their current states.
    pub async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>, ClientError> {
        self.call_decoded("supervisor.getAllProcessInfo", &[]).await
    }

    /// Start or stop one named process.
    ///
    /// `change` must be `"start"` or `"stop"`; anything else is rejected
    /// locally without touching the wire.
    pub async fn change_process_state(
        &self,
        change: &str,
        process_name: &str,
    ) -> Result<bool, ClientError> {
        validate_state_change(change)?;
        self.call_decoded(
            &format!("supervisor.{change}Process"),
            &[Value::String(process_name.to_string())],
        )
        .await
    }

    /// Start or stop every managed process, waiting for completion.
    pub async fn change_all_process_state(
        &self,
        change: &str,
    ) -> Result<Vec<ProcessInfo>, ClientError> {
        validate_state_change(change)?;
        self.call_decoded(
            &format!("supervisor.{change}AllProcesses"),
            &[Value::Bool(true)],
        )
        .await
    }

    /// Send a named signal (e.g. `"HUP"`) to one process.
    pub async fn signal_process(
        &self,
        signal: &str,
        process_name: &str,
    ) -> Result<bool, ClientError> {
        self.call_decoded(
            "supervisor.signalProcess",
            &[
                Value::String(process_name.to_string()),
                Value::String(signal.to_string()),
            ],
        )
        .await
    }

    /// Send a named signal to every managed process.
    pub async fn signal_all_processes(
        &self,
        signal: &str,
    ) -> Result<Vec<ProcessInfo>, ClientError> {
        self.call_decoded(
            "supervisor.signalAllProcesses",
            &[Value::String(signal.to_string())],
        )
        .await
    }

    /// Ask the daemon to shut itself down.
    pub async fn shutdown(&self) -> Result<bool, ClientError> {
        self.call_decoded("supervisor.shutdown", &[]).await
    }

    /// Reload the daemon configuration and report which process groups were
    /// added, changed, or removed.
    ///
    /// The reply carries the three lists as unlabeled positional arrays, so
    /// it is decoded with the streaming processor rather than the generic
    /// value decoder.
    pub async fn reload_config(&self) -> Result<ReloadConfigResult, ClientError> {
        let body = self.call("supervisor.reloadConfig", &[]).await?;
        decode_reload_groups(&body).map_err(ClientError::from)
    }
}

fn validate_state_change(change: &str) -> Result<(), ClientError> {
    if STATE_CHANGES.contains(&change) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "unknown state change `{change}`, expected one of {STATE_CHANGES:?}"
        )))
    }
}

/// Reconstruct the added/changed/removed group lists from the unlabeled
/// array-of-arrays reply.
///
/// State machine owned by this single call: a boundary flag plus a shared
/// group index. Each group container produces an enter pulse and an exit
/// pulse; the first of the pair advances the index, the second closes the
/// group out. That makes the index advance exactly once per sibling group,
/// populated or empty, so an empty middle group still occupies its
/// positional slot.
fn decode_reload_groups(body: &[u8]) -> Result<ReloadConfigResult, XmlRpcError> {
    let group_index = Cell::new(-1i32);
    let inside_group = Cell::new(false);
    let saw_fault = Cell::new(false);
    let groups: RefCell<[Vec<String>; 3]> = RefCell::new(Default::default());

    let mut processor = PathProcessor::new();
    // The group paths never match inside a fault reply, so a fault would
    // otherwise stream into three empty lists. Flag it and re-decode below.
    processor.on_container(RELOAD_FAULT_PATH, || saw_fault.set(true));
    processor.on_container(RELOAD_GROUP_PATH, || {
        if inside_group.get() {
            inside_group.set(false);
        } else {
            inside_group.set(true);
            group_index.set(group_index.get() + 1);
        }
    });
    processor.on_leaf(RELOAD_NAME_PATH, |name| {
        let mut groups = groups.borrow_mut();
        match group_index.get() {
            0 => groups[0].push(name.to_string()),
            1 => groups[1].push(name.to_string()),
            2 => groups[2].push(name.to_string()),
            // Indices past the third group are tolerated and dropped; the
            // daemon may grow the reply in future protocol revisions.
            _ => {}
        }
    });
    processor.process(body)?;
    drop(processor);

    if saw_fault.get() {
        return match xmlrpc::decode_reply(body) {
            Err(err) => Err(err),
            Ok(value) => Err(XmlRpcError::Shape(format!(
                "fault element carrying a non-fault payload: {value:?}"
            ))),
        };
    }

    let [added, changed, removed] = groups.into_inner();
    Ok(ReloadConfigResult {
        added_group: added,
        changed_group: changed,
        removed_group: removed,
    })
}

impl FromValue for ProcessInfo {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        let Value::Struct(members) = value else {
            return Err(XmlRpcError::Shape(format!(
                "expected process record, got {value:?}"
            )));
        };
        let mut info = ProcessInfo::default();
        for (name, member) in members {
            match name.as_str() {
                "name" => info.name = String::from_value(member)?,
                "group" => info.group = String::from_value(member)?,
                "description" => info.description = String::from_value(member)?,
                "start" => info.start = i64::from_value(member)?,
                "stop" => info.stop = i64::from_value(member)?,
                "now" => info.now = i64::from_value(member)?,
                "state" => info.state = i64::from_value(member)?,
                "statename" => info.statename = String::from_value(member)?,
                "spawnerr" => info.spawnerr = String::from_value(member)?,
                "exitstatus" => info.exitstatus = i64::from_value(member)?,
                "logfile" => info.logfile = String::from_value(member)?,
                "stdout_logfile" => info.stdout_logfile = String::from_value(member)?,
                "stderr_logfile" => info.stderr_logfile = String::from_value(member)?,
                "pid" => info.pid = i64::from_value(member)?,
                // Unknown members are tolerated for forward compatibility.
                _ => {}
            }
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reload_reply(groups: &[&[&str]]) -> Vec<u8> {
        let value = Value::Array(
            groups
                .iter()
                .map(|group| {
                    Value::Array(
                        group
                            .iter()
                            .map(|name| Value::String(name.to_string()))
                            .collect(),
                    )
                })
                .collect(),
        );
        xmlrpc::encode_response(&value)
    }

    #[test]
    fn test_state_change_validation() {
        assert!(validate_state_change("start").is_ok());
        assert!(validate_state_change("stop").is_ok());
        assert!(matches!(
            validate_state_change("restart"),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            validate_state_change(""),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_reload_groups_with_empty_middle_group() {
        let body = reload_reply(&[&["a", "b"], &[], &["c"]]);
        let result = decode_reload_groups(&body).unwrap();
        assert_eq!(result.added_group, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(result.changed_group, Vec::<String>::new());
        assert_eq!(result.removed_group, vec!["c".to_string()]);
    }

    #[test]
    fn test_reload_groups_preserve_every_leaf_exactly_once() {
        let body = reload_reply(&[&["a"], &["b", "c", "d"], &["e"]]);
        let result = decode_reload_groups(&body).unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(result.added_group, vec!["a".to_string()]);
        assert_eq!(
            result.changed_group,
            vec!["b".to_string(), "c".to_string(), "d".to_string()]
        );
        assert_eq!(result.removed_group, vec!["e".to_string()]);
    }

    #[test]
    fn test_reload_groups_all_empty() {
        let body = reload_reply(&[&[], &[], &[]]);
        let result = decode_reload_groups(&body).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_reload_groups_ignore_extra_trailing_groups() {
        // A fourth positional group is silently dropped rather than
        // rejected, matching the daemon's forward-compatible reply shape.
        let body = reload_reply(&[&["a"], &[], &["c"], &["future"]]);
        let result = decode_reload_groups(&body).unwrap();
        assert_eq!(result.added_group, vec!["a".to_string()]);
        assert_eq!(result.removed_group, vec!["c".to_string()]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_reload_groups_surface_daemon_fault() {
        let body = xmlrpc::encode_fault(6, "SHUTDOWN_STATE");
        let err = decode_reload_groups(&body).unwrap_err();
        match err {
            XmlRpcError::Fault { code, message } => {
                assert_eq!(code, 6);
                assert_eq!(message, "SHUTDOWN_STATE");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_reload_groups_discard_partial_results_on_truncation() {
        let body = reload_reply(&[&["a", "b"], &[], &["c"]]);
        let truncated = &body[..body.len() / 2];
        assert!(decode_reload_groups(truncated).is_err());
    }

    #[test]
    fn test_process_info_from_struct_members() {
        let value = Value::Struct(vec![
            ("name".to_string(), Value::String("webapp".to_string())),
            ("group".to_string(), Value::String("web".to_string())),
            ("state".to_string(), Value::Int(20)),
            ("statename".to_string(), Value::String("RUNNING".to_string())),
            ("pid".to_string(), Value::Int(4242)),
            ("someday".to_string(), Value::String("ignored".to_string())),
        ]);
        let info = ProcessInfo::from_value(value).unwrap();
        assert_eq!(info.name, "webapp");
        assert_eq!(info.group, "web");
        assert_eq!(info.pid, 4242);
        assert!(info.is_running());
    }

    #[test]
    fn test_process_info_rejects_non_struct() {
        assert!(ProcessInfo::from_value(Value::String("nope".to_string())).is_err());
    }
}
