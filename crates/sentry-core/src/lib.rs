//! Sentry core: wire protocol primitives, error types, and the reporting
//! capability.
//!
//! This crate defines the wire-level contracts and error surface shared by the
//! lookup server and the benchmark client. It does not depend on an async
//! runtime or on sockets (only `bytes`, `serde`, `thiserror`, `tracing` and
//! `parking_lot`), so both sides and offline tooling can reuse it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `SentryError`/`Result` so the server
//! does not crash on malformed input or bad traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;
pub mod report;

/// Shared result type.
pub use error::{ErrorKind, Result, SentryError};
pub use report::{ErrorEvent, Reporter, SharedReporter, TracingReporter};
