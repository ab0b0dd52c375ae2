//! Sentry benchmark harness.
//!
//! A [`BenchmarkCoordinator`] runs a [`BenchmarkJob`] against a lookup server:
//! it checks the target once, spawns `workers` tasks sharing one [`Budget`],
//! joins them, and merges their [`WorkerStats`] into an [`AggregateReport`].

pub mod budget;
pub mod client;
pub mod coordinator;
pub mod job;
pub mod stats;
pub mod worker;

pub use budget::Budget;
pub use client::LookupClient;
pub use coordinator::{BenchmarkCoordinator, CancelHandle};
pub use job::{BenchmarkJob, KeySource};
pub use stats::{AggregateReport, LatencySummary, WorkerStats};
pub use worker::BenchmarkWorker;
