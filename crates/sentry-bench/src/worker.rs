//! One benchmark worker: one connection, sequential lookups.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use sentry_core::error::SentryError;
use sentry_core::report::{ErrorEvent, SharedReporter};

use crate::budget::Budget;
use crate::client::LookupClient;
use crate::job::BenchmarkJob;
use crate::stats::WorkerStats;

pub struct BenchmarkWorker {
    id: usize,
    job: Arc<BenchmarkJob>,
    budget: Arc<Budget>,
    cancel: watch::Receiver<bool>,
    reporter: SharedReporter,
}

impl BenchmarkWorker {
    pub fn new(
        id: usize,
        job: Arc<BenchmarkJob>,
        budget: Arc<Budget>,
        cancel: watch::Receiver<bool>,
        reporter: SharedReporter,
    ) -> Self {
        Self { id, job, budget, cancel, reporter }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn fail(&self, stats: &mut WorkerStats, err: &SentryError) {
        stats.record_error(err);
        self.reporter.report(ErrorEvent::from_error("bench.worker", err));
    }

    /// Runs until the budget is spent, the run is cancelled, or the
    /// connection cannot be re-established. Returns whatever was recorded.
    pub async fn run(self, mut stats: WorkerStats) -> WorkerStats {
        let job = Arc::clone(&self.job);
        let mut keys = job.keys.stream(self.id, job.seed);

        let mut client = match LookupClient::connect(&job.target, job.connect_timeout).await {
            Ok(c) => c,
            Err(e) => {
                self.fail(&mut stats, &e);
                return stats;
            }
        };

        loop {
            if self.cancelled() || !self.budget.try_acquire() {
                break;
            }

            let key = keys.next_key();
            let started = Instant::now();
            match client.lookup(&key, job.lookup_timeout).await {
                Ok(result) => stats.record_success(started.elapsed(), &result.decision),
                Err(e) => {
                    self.fail(&mut stats, &e);
                    tracing::debug!(worker = self.id, error = %e, "lookup failed, reconnecting");

                    if self.cancelled() {
                        break;
                    }
                    client = match LookupClient::connect(&job.target, job.connect_timeout).await {
                        Ok(c) => c,
                        Err(e) => {
                            self.fail(&mut stats, &e);
                            tracing::debug!(worker = self.id, "reconnect failed, stopping");
                            break;
                        }
                    };
                }
            }
        }

        tracing::debug!(
            worker = self.id,
            completed = stats.completed,
            errors = stats.errors,
            "worker finished"
        );
        stats
    }
}
