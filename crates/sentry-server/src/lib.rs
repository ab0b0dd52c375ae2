//! Sentry lookup server library.
//!
//! This crate wires the policy store, lookup engine, TCP transport, and
//! lifecycle into one server. It is consumed by the `sentry` binary and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod engine;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod server;
pub mod transport;

pub use server::{SentryServer, ServerHandle, ServerState};
