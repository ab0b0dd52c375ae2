use std::sync::Arc;
use std::time::{Duration, Instant};

use sentry_core::protocol::{Decision, Source};

use crate::policy::{unix_now, PolicyStore, Snapshot};

use super::cache::LruCache;

/// Resolution of a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub decision: Decision,
    /// `false` when the default decision was applied.
    pub found: bool,
    pub source: Source,
    pub latency: Duration,
}

#[derive(Debug, Clone)]
struct Cached {
    generation: u64,
    decision: Decision,
    found: bool,
    expires_at: Option<u64>,
    log: bool,
}

impl Cached {
    fn is_fresh(&self, generation: u64, now: u64) -> bool {
        self.generation == generation && !matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// Cache-first resolver over the policy store.
///
/// Cache entries remember the snapshot generation they were computed from, so
/// a reload invalidates them without a global flush.
pub struct LookupEngine {
    store: Arc<PolicyStore>,
    cache: LruCache<Cached>,
}

impl LookupEngine {
    pub fn new(store: Arc<PolicyStore>, cache_capacity: usize, cache_shards: usize) -> Self {
        Self {
            store,
            cache: LruCache::new(cache_capacity, cache_shards),
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolve `key`. Never fails: unknown keys get the snapshot's default.
    pub fn resolve(&self, key: &str) -> LookupResult {
        let started = Instant::now();
        let snapshot = self.store.current();
        let now = unix_now();

        if let Some(hit) = self.cache.get(key) {
            if hit.is_fresh(snapshot.generation(), now) {
                if hit.log {
                    tracing::info!(key, decision = %hit.decision, source = "cache", "logged lookup");
                }
                return LookupResult {
                    decision: hit.decision,
                    found: hit.found,
                    source: Source::Cache,
                    latency: started.elapsed(),
                };
            }
        }

        let (cached, source) = Self::resolve_uncached(&snapshot, key, now);
        let result = LookupResult {
            decision: cached.decision.clone(),
            found: cached.found,
            source,
            latency: started.elapsed(),
        };
        self.cache.insert(key.to_owned(), cached);
        result
    }

    fn resolve_uncached(snapshot: &Snapshot, key: &str, now: u64) -> (Cached, Source) {
        let res = snapshot.resolve(key, now);
        let (decision, source) = match res.decision {
            Some(d) => (d.clone(), Source::Store),
            None => (snapshot.default_decision().clone(), Source::Default),
        };
        if res.log {
            tracing::info!(
                key,
                rewritten_to = res.rewritten_to,
                decision = %decision,
                source = "store",
                "logged lookup"
            );
        }

        let cached = Cached {
            generation: snapshot.generation(),
            decision,
            found: source == Source::Store,
            expires_at: res.expires_at,
            log: res.log,
        };
        (cached, source)
    }

    /// Drop every cached answer (after a reload the old generation is dead weight).
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(policy: &str, capacity: usize) -> LookupEngine {
        let store = Arc::new(PolicyStore::from_source(policy).unwrap());
        LookupEngine::new(store, capacity, 4)
    }

    const AB: &str = r#"
default: value
default_value: unknown
entries:
  - { key: a, decision: allow }
  - { key: b, decision: block }
"#;

    #[test]
    fn unknown_keys_get_the_default() {
        let e = engine(AB, 16);
        let r = e.resolve("nope");
        assert_eq!(r.decision, Decision::Value("unknown".into()));
        assert!(!r.found);
        assert_eq!(r.source, Source::Default);
    }

    #[test]
    fn second_resolution_comes_from_cache() {
        let e = engine(AB, 16);
        for key in ["a", "b", "zzz"] {
            let first = e.resolve(key);
            let second = e.resolve(key);
            assert_ne!(first.source, Source::Cache);
            assert_eq!(second.source, Source::Cache);
            assert_eq!(second.decision, first.decision);
            assert_eq!(second.found, first.found);
        }
    }

    #[test]
    fn reload_invalidates_cached_results() {
        let e = engine(AB, 16);
        assert_eq!(e.resolve("a").decision, Decision::Allow);
        assert_eq!(e.resolve("a").source, Source::Cache);

        e.store().reload("entries: [{ key: a, decision: block }]").unwrap();
        let r = e.resolve("a");
        assert_eq!(r.decision, Decision::Block);
        assert_eq!(r.source, Source::Store);
    }

    #[test]
    fn disabled_cache_always_hits_store() {
        let e = engine(AB, 0);
        assert_eq!(e.resolve("a").source, Source::Store);
        assert_eq!(e.resolve("a").source, Source::Store);
        assert_eq!(e.cached_len(), 0);
    }

    #[test]
    fn rewritten_keys_take_the_target_decision() {
        let e = engine(
            r#"
entries:
  - { key: b, decision: block }
  - { key: www.b, decision: rewrite, value: b }
rules:
  - { pattern: '^cdn\.', decision: rewrite, value: nowhere }
"#,
            16,
        );

        let r = e.resolve("www.b");
        assert_eq!(r.decision, Decision::Block);
        assert!(r.found);
        assert_eq!(r.source, Source::Store);
        assert_eq!(e.resolve("www.b").source, Source::Cache);

        let r = e.resolve("cdn.example");
        assert_eq!(r.decision, Decision::Allow);
        assert!(!r.found);
        assert_eq!(r.source, Source::Default);
    }

    #[test]
    fn clear_cache_forces_store_lookups() {
        let e = engine(AB, 16);
        e.resolve("a");
        assert_eq!(e.cached_len(), 1);
        e.clear_cache();
        assert_eq!(e.cached_len(), 0);
        assert_eq!(e.resolve("a").source, Source::Store);
    }

    #[test]
    fn expired_entry_in_cache_is_not_served() {
        let e = engine("entries: [{ key: gone, decision: block, expires_at: 1 }]", 16);
        let r = e.resolve("gone");
        assert_eq!(r.source, Source::Default);
        assert_eq!(r.decision, Decision::Allow);
    }
}
