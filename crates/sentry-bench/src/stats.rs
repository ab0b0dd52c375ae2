//! Per-worker statistics and the merged run report.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use sentry_core::error::{Result, SentryError};
use sentry_core::protocol::Decision;

/// Latency histogram in microseconds, 3 significant figures, auto-resizing.
fn latency_histogram() -> Result<Histogram<u64>> {
    Histogram::new(3).map_err(|e| SentryError::Internal(format!("latency histogram: {e}")))
}

/// Owned by exactly one worker while it runs.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub completed: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub latency_us: Histogram<u64>,
    pub decisions: BTreeMap<&'static str, u64>,
}

impl WorkerStats {
    pub fn new() -> Result<Self> {
        Ok(Self {
            completed: 0,
            errors: 0,
            timeouts: 0,
            latency_us: latency_histogram()?,
            decisions: BTreeMap::new(),
        })
    }

    pub fn record_success(&mut self, latency: Duration, decision: &Decision) {
        self.completed += 1;
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX).max(1);
        self.latency_us.saturating_record(micros);
        *self.decisions.entry(decision.label()).or_default() += 1;
    }

    pub fn record_error(&mut self, err: &SentryError) {
        self.errors += 1;
        if matches!(err, SentryError::LookupTimeout) {
            self.timeouts += 1;
        }
    }

    /// Lookups attempted (successful or not).
    pub fn attempts(&self) -> u64 {
        self.completed + self.errors
    }

    /// Counters are always summed; an error means only the latency samples
    /// of `other` could not be added.
    pub fn merge(&mut self, other: &WorkerStats) -> Result<()> {
        self.completed += other.completed;
        self.errors += other.errors;
        self.timeouts += other.timeouts;
        for (label, n) in &other.decisions {
            *self.decisions.entry(*label).or_default() += *n;
        }
        self.latency_us
            .add(&other.latency_us)
            .map_err(|e| SentryError::Internal(format!("latency histogram merge: {e:?}")))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub mean_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencySummary {
    fn from_histogram(h: &Histogram<u64>) -> Self {
        if h.is_empty() {
            return Self::default();
        }
        Self {
            mean_us: h.mean(),
            p50_us: h.value_at_quantile(0.50),
            p90_us: h.value_at_quantile(0.90),
            p99_us: h.value_at_quantile(0.99),
            max_us: h.max(),
        }
    }
}

/// Summary of one benchmark run. Built once, after every worker has joined.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub target: String,
    pub workers: usize,
    /// Successful lookups.
    pub total: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub elapsed_secs: f64,
    /// Successful lookups per second.
    pub throughput: f64,
    pub latency: LatencySummary,
    pub error_rate: f64,
    pub decisions: BTreeMap<&'static str, u64>,
}

impl AggregateReport {
    /// Build the report from the stats of every worker, already merged.
    pub fn new(target: &str, workers: usize, merged: WorkerStats, elapsed: Duration) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let throughput = if elapsed_secs > 0.0 {
            merged.completed as f64 / elapsed_secs
        } else {
            0.0
        };
        let attempts = merged.attempts();
        let error_rate = if attempts > 0 {
            merged.errors as f64 / attempts as f64
        } else {
            0.0
        };

        Self {
            target: target.to_owned(),
            workers,
            total: merged.completed,
            errors: merged.errors,
            timeouts: merged.timeouts,
            elapsed_secs,
            throughput,
            latency: LatencySummary::from_histogram(&merged.latency_us),
            error_rate,
            decisions: merged.decisions,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SentryError::Internal(format!("report encode: {e}")))
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "target       {}", self.target)?;
        writeln!(f, "workers      {}", self.workers)?;
        writeln!(f, "lookups      {}", self.total)?;
        writeln!(f, "errors       {} ({} timeouts, {:.2}%)", self.errors, self.timeouts, self.error_rate * 100.0)?;
        writeln!(f, "elapsed      {:.3}s", self.elapsed_secs)?;
        writeln!(f, "throughput   {:.1} lookups/s", self.throughput)?;
        writeln!(
            f,
            "latency us   mean {:.1}  p50 {}  p90 {}  p99 {}  max {}",
            self.latency.mean_us,
            self.latency.p50_us,
            self.latency.p90_us,
            self.latency.p99_us,
            self.latency.max_us
        )?;
        if !self.decisions.is_empty() {
            let parts: Vec<String> =
                self.decisions.iter().map(|(k, v)| format!("{k}={v}")).collect();
            writeln!(f, "decisions    {}", parts.join(" "))?;
        }
        Ok(())
    }
}
