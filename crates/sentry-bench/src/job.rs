//! Benchmark job description and per-worker key streams.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sentry_core::error::{Result, SentryError};

/// Where lookup keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Cycle through the list; each worker starts at its own offset.
    Fixed(Vec<String>),
    /// Uniform draws from the list.
    Random(Vec<String>),
    /// `prefix-<n mod span>`.
    Sequential { prefix: String, span: u64 },
}

impl Default for KeySource {
    fn default() -> Self {
        KeySource::Sequential { prefix: "key".to_owned(), span: 1_000 }
    }
}

impl KeySource {
    fn validate(&self) -> Result<()> {
        match self {
            KeySource::Fixed(keys) | KeySource::Random(keys) => {
                if keys.is_empty() {
                    return Err(SentryError::ConfigLoad("key list must not be empty".into()));
                }
                if keys.iter().any(|k| k.is_empty()) {
                    return Err(SentryError::ConfigLoad("keys must be non-empty strings".into()));
                }
            }
            KeySource::Sequential { span, .. } => {
                if *span == 0 {
                    return Err(SentryError::ConfigLoad("sequential span must be > 0".into()));
                }
            }
        }
        Ok(())
    }

    /// Key stream for one worker.
    pub fn stream(&self, worker_id: usize, seed: Option<u64>) -> KeyStream {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s ^ worker_id as u64),
            None => StdRng::from_entropy(),
        };
        KeyStream {
            source: self.clone(),
            cursor: worker_id as u64,
            rng,
        }
    }
}

pub struct KeyStream {
    source: KeySource,
    cursor: u64,
    rng: StdRng,
}

impl KeyStream {
    pub fn next_key(&mut self) -> String {
        let n = self.cursor;
        self.cursor = self.cursor.wrapping_add(1);

        match &self.source {
            KeySource::Fixed(keys) => keys[(n % keys.len() as u64) as usize].clone(),
            KeySource::Random(keys) => keys[self.rng.gen_range(0..keys.len())].clone(),
            KeySource::Sequential { prefix, span } => format!("{prefix}-{}", n % span),
        }
    }
}

/// One benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkJob {
    /// `host:port` of the server under test.
    pub target: String,
    pub workers: usize,
    /// Total lookups across all workers; 0 = unbounded.
    pub limit: u64,
    pub keys: KeySource,
    pub lookup_timeout: Duration,
    pub connect_timeout: Duration,
    /// Stop after this long even if budget remains.
    pub duration: Option<Duration>,
    /// Seed for the random key source; entropy when absent.
    pub seed: Option<u64>,
}

impl BenchmarkJob {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workers: 1,
            limit: 0,
            keys: KeySource::default(),
            lookup_timeout: Duration::from_millis(1_000),
            connect_timeout: Duration::from_millis(2_000),
            duration: None,
            seed: None,
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = n;
        self
    }

    pub fn keys(mut self, keys: KeySource) -> Self {
        self.keys = keys;
        self
    }

    pub fn lookup_timeout(mut self, t: Duration) -> Self {
        self.lookup_timeout = t;
        self
    }

    pub fn duration(mut self, d: Option<Duration>) -> Self {
        self.duration = d;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(SentryError::ConfigLoad("benchmark target must be set".into()));
        }
        if self.workers == 0 {
            return Err(SentryError::ConfigLoad("workers must be >= 1".into()));
        }
        if self.lookup_timeout.is_zero() {
            return Err(SentryError::ConfigLoad("lookup timeout must be > 0".into()));
        }
        self.keys.validate()
    }
}
