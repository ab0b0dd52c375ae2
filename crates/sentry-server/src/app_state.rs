//! Shared application state for the lookup server.
//!
//! Holds everything a session needs (engine, metrics, reporter, config) plus
//! the lifecycle channel the listener and sessions watch for draining.

use std::sync::Arc;

use tokio::sync::watch;

use sentry_core::error::{Result, SentryError};
use sentry_core::report::{ErrorEvent, SharedReporter};

use crate::config::SentryConfig;
use crate::engine::LookupEngine;
use crate::obs::SentryMetrics;
use crate::policy::PolicyStore;
use crate::server::ServerState;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: SentryConfig,
    engine: LookupEngine,
    metrics: SentryMetrics,
    reporter: SharedReporter,
    lifecycle: watch::Sender<ServerState>,
}

impl AppState {
    pub fn new(cfg: SentryConfig, store: Arc<PolicyStore>, reporter: SharedReporter) -> Self {
        let engine = LookupEngine::new(store, cfg.cache.capacity, cfg.cache.shards);
        let (lifecycle, _) = watch::channel(ServerState::Starting);
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                engine,
                metrics: SentryMetrics::default(),
                reporter,
                lifecycle,
            }),
        }
    }

    pub fn cfg(&self) -> &SentryConfig {
        &self.inner.cfg
    }

    pub fn engine(&self) -> &LookupEngine {
        &self.inner.engine
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        self.inner.engine.store()
    }

    pub fn metrics(&self) -> &SentryMetrics {
        &self.inner.metrics
    }

    pub fn report(&self, component: &'static str, err: &SentryError) {
        self.inner.reporter.report(ErrorEvent::from_error(component, err));
    }

    pub fn state(&self) -> ServerState {
        *self.inner.lifecycle.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.inner.lifecycle.subscribe()
    }

    /// Move forward in the lifecycle; never goes backwards.
    pub fn advance(&self, next: ServerState) {
        self.inner.lifecycle.send_if_modified(|cur| {
            if next > *cur {
                *cur = next;
                true
            } else {
                false
            }
        });
        if next >= ServerState::Draining {
            self.inner.metrics.set_draining();
        }
    }

    pub fn is_draining(&self) -> bool {
        self.state() >= ServerState::Draining
    }

    /// Re-read the configured policy source and swap it in. On failure the
    /// active snapshot is kept and the error is reported. On success cached
    /// answers of the previous generation are dropped.
    pub fn reload_policy(&self) -> Result<u64> {
        let res = self.store().reload_file(&self.inner.cfg.policy.source);
        self.finish_reload(res.map(|s| s.generation()))
    }

    /// Same as [`AppState::reload_policy`] with an in-memory document.
    pub fn reload_policy_from_str(&self, source_text: &str) -> Result<u64> {
        let res = self.store().reload(source_text);
        self.finish_reload(res.map(|s| s.generation()))
    }

    fn finish_reload(&self, res: Result<u64>) -> Result<u64> {
        match &res {
            Ok(generation) => {
                self.engine().clear_cache();
                self.metrics().reloads.inc(&[("result", "ok")]);
                tracing::info!(generation, "policy reloaded");
            }
            Err(e) => {
                self.metrics().reloads.inc(&[("result", "error")]);
                self.report("policy", e);
            }
        }
        res
    }

    /// Extra gauges rendered next to the registry.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let snap = self.store().current();
        vec![
            ("sentry_policy_generation", snap.generation()),
            ("sentry_policy_entries", snap.len() as u64),
            ("sentry_policy_rules", snap.rule_count() as u64),
            ("sentry_cache_entries", self.engine().cached_len() as u64),
            ("sentry_cache_capacity", self.engine().cache_capacity() as u64),
        ]
    }
}
