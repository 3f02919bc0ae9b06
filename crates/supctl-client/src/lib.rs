#![deny(unsafe_code)]

//! Client library for the XML-RPC control interface of a
//! supervisord-compatible process-supervision daemon.
//!
//! Supports two transports behind one call surface:
//!
//! ```text
//! ┌────────────────┐   http(s)://host:port   ┌──────────────┐
//! │ Supervisor     │────────────────────────▶│    Daemon    │
//! │ Client         │   unix:///path.sock     │    /RPC2     │
//! └────────────────┘   (HTTP/1.1 on socket)  └──────────────┘
//! ```
//!
//! Each operation is a single synchronous exchange: build the call, resolve
//! the transport, validate the response status, decode the reply. Uniform
//! replies go through the generic [`xmlrpc`] decoder; the positionally
//! grouped `reloadConfig` reply goes through the [`stream`] processor.

/// Typed per-method client operations.
pub mod client;
/// The four-kind failure taxonomy.
pub mod error;
/// Path-keyed streaming document processor.
pub mod stream;
/// XML-RPC wire codec and typed value extraction.
pub mod xmlrpc;

mod transport;

pub use client::SupervisorClient;
pub use error::ClientError;
pub use stream::PathProcessor;
pub use supctl_types::{ProcessInfo, ReloadConfigResult};
