#![deny(unsafe_code)]

//! Shared test utilities for the supctl workspace.
//!
//! Provides a mock supervision daemon and tracing helpers so individual
//! crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! supctl-test-utils = { workspace = true }
//! ```

pub mod daemon;
pub mod tracing_setup;

pub use daemon::MockDaemon;
