//! Lightweight in-process metrics.
//!
//! Metrics are stored as atomics keyed by label sets and rendered in Prometheus
//! text format by the admin `/metrics` handler.

pub mod metrics;

pub use metrics::SentryMetrics;
