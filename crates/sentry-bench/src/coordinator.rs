//! Runs a [`BenchmarkJob`]: check, spawn, join, merge.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinSet;

use sentry_core::error::{Result, SentryError};
use sentry_core::report::{ErrorEvent, SharedReporter};

use crate::budget::Budget;
use crate::client::LookupClient;
use crate::job::BenchmarkJob;
use crate::stats::{AggregateReport, WorkerStats};
use crate::worker::BenchmarkWorker;

/// Stops a running benchmark. Workers notice before their next lookup.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct BenchmarkCoordinator {
    job: Arc<BenchmarkJob>,
    reporter: SharedReporter,
    cancel: Arc<watch::Sender<bool>>,
}

impl BenchmarkCoordinator {
    pub fn new(job: BenchmarkJob, reporter: SharedReporter) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            job: Arc::new(job),
            reporter,
            cancel: Arc::new(tx),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { tx: Arc::clone(&self.cancel) }
    }

    /// Consumes the coordinator; the report is produced exactly once.
    pub async fn run(self) -> Result<AggregateReport> {
        let job = Arc::clone(&self.job);
        job.validate()?;

        // fail fast before any worker is spawned
        match LookupClient::connect(&job.target, job.connect_timeout).await {
            Ok(conn) => drop(conn),
            Err(e) => {
                let err = SentryError::TargetUnreachable(format!("{}: {e}", job.target));
                self.reporter.report(ErrorEvent::from_error("bench.coordinator", &err));
                return Err(err);
            }
        }

        let budget = Arc::new(Budget::new(job.limit));
        let template = WorkerStats::new()?;

        tracing::info!(
            server = %job.target,
            workers = job.workers,
            limit = job.limit,
            duration_ms = job.duration.map(|d| d.as_millis() as u64),
            "benchmark starting"
        );

        let started = Instant::now();
        let mut workers = JoinSet::new();
        for id in 0..job.workers {
            let worker = BenchmarkWorker::new(
                id,
                Arc::clone(&job),
                Arc::clone(&budget),
                self.cancel.subscribe(),
                Arc::clone(&self.reporter),
            );
            workers.spawn(worker.run(template.clone()));
        }

        let deadline = job.duration.map(|d| {
            let cancel = self.cancel_handle();
            tokio::spawn(async move {
                tokio::time::sleep(d).await;
                tracing::debug!("benchmark duration elapsed");
                cancel.cancel();
            })
        });

        let mut merged = template;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(s) => {
                    if let Err(e) = merged.merge(&s) {
                        self.reporter.report(ErrorEvent::from_error("bench.coordinator", &e));
                    }
                }
                Err(e) => {
                    let err = SentryError::Internal(format!("worker task failed: {e}"));
                    self.reporter.report(ErrorEvent::from_error("bench.coordinator", &err));
                }
            }
        }
        let elapsed = started.elapsed();

        if let Some(task) = deadline {
            task.abort();
        }

        let report = AggregateReport::new(&job.target, job.workers, merged, elapsed);
        tracing::info!(
            total = report.total,
            errors = report.errors,
            throughput = report.throughput,
            "benchmark finished"
        );
        Ok(report)
    }
}
