//! Copy-on-write policy snapshots.
//!
//! Readers clone the current `Arc<Snapshot>` once per lookup; reload compiles a
//! complete snapshot off to the side and swaps the pointer. A failed reload
//! never touches the active snapshot.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use regex::Regex;

use sentry_core::error::{Result, SentryError};
use sentry_core::protocol::Decision;

use super::source;

/// What a matching entry or rule does with the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Answer with this decision.
    Decide(Decision),
    /// Look the key up again under another name (one hop).
    Rewrite(String),
}

/// One exact-key policy entry.
#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub key: String,
    pub action: Action,
    pub expires_at: Option<u64>,
    pub log: bool,
}

impl PolicyEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// Ordered pattern rule, consulted when the exact map misses.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern: Regex,
    pub action: Action,
    pub log: bool,
}

/// What a key matched in a snapshot.
#[derive(Debug, Clone, Copy)]
pub enum Match<'a> {
    Entry(&'a PolicyEntry),
    Rule(&'a PatternRule),
}

impl<'a> Match<'a> {
    pub fn action(&self) -> &'a Action {
        match self {
            Match::Entry(e) => &e.action,
            Match::Rule(r) => &r.action,
        }
    }

    pub fn log(&self) -> bool {
        match self {
            Match::Entry(e) => e.log,
            Match::Rule(r) => r.log,
        }
    }

    /// Expiry that bounds how long a cached copy of this match stays valid.
    pub fn expires_at(&self) -> Option<u64> {
        match self {
            Match::Entry(e) => e.expires_at,
            Match::Rule(_) => None,
        }
    }
}

/// Final policy answer for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// `None` when nothing decided the key; the default applies.
    pub decision: Option<&'a Decision>,
    pub log: bool,
    /// Earliest expiry among the matches involved.
    pub expires_at: Option<u64>,
    pub rewritten_to: Option<&'a str>,
}

fn earliest(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Immutable, fully loaded view of the policy.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    entries: HashMap<String, PolicyEntry>,
    rules: Vec<PatternRule>,
    default: Decision,
}

impl Snapshot {
    /// Parse and validate a policy document (generation 0 until installed).
    pub fn parse(source_text: &str) -> Result<Self> {
        let compiled = source::compile(source::parse(source_text)?)?;
        Ok(Self {
            generation: 0,
            entries: compiled.entries,
            rules: compiled.rules,
            default: compiled.default,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn default_decision(&self) -> &Decision {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Live (non-expired) exact entry.
    pub fn get(&self, key: &str, now: u64) -> Option<&PolicyEntry> {
        self.entries.get(key).filter(|e| !e.is_expired(now))
    }

    /// Exact entry first, then the first matching pattern rule.
    pub fn matching(&self, key: &str, now: u64) -> Option<Match<'_>> {
        if let Some(e) = self.get(key, now) {
            return Some(Match::Entry(e));
        }
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(key))
            .map(Match::Rule)
    }

    /// Match `key`, following at most one rewrite. A rewrite whose target
    /// matches nothing, or only another rewrite, falls back to the default.
    pub fn resolve(&self, key: &str, now: u64) -> Resolution<'_> {
        let Some(first) = self.matching(key, now) else {
            return Resolution { decision: None, log: false, expires_at: None, rewritten_to: None };
        };

        match first.action() {
            Action::Decide(d) => Resolution {
                decision: Some(d),
                log: first.log(),
                expires_at: first.expires_at(),
                rewritten_to: None,
            },
            Action::Rewrite(target) => {
                let second = self.matching(target, now);
                let decision = match second.map(|m| m.action()) {
                    Some(Action::Decide(d)) => Some(d),
                    Some(Action::Rewrite(_)) | None => None,
                };
                Resolution {
                    decision,
                    log: first.log() || second.is_some_and(|m| m.log()),
                    expires_at: earliest(first.expires_at(), second.and_then(|m| m.expires_at())),
                    rewritten_to: Some(target),
                }
            }
        }
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<Snapshot>>,
}

impl PolicyStore {
    /// Validate `source_text` into a snapshot without installing it.
    pub fn load(source_text: &str) -> Result<Snapshot> {
        Snapshot::parse(source_text)
    }

    /// Build a store whose first snapshot has generation 1.
    pub fn new(mut snapshot: Snapshot) -> Self {
        snapshot.generation = 1;
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn from_source(source_text: &str) -> Result<Self> {
        Ok(Self::new(Self::load(source_text)?))
    }

    /// [`PolicyStore::load`] from a file on disk.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Snapshot> {
        Self::load(&read_source(path.as_ref())?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Self::load_file(path)?))
    }

    /// Latest fully loaded snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Replace the snapshot once `source_text` fully validates. On error the
    /// previous snapshot stays active.
    pub fn reload(&self, source_text: &str) -> Result<Arc<Snapshot>> {
        let mut next = Self::load(source_text)?;

        let mut guard = self.current.write();
        next.generation = guard.generation + 1;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }

    pub fn reload_file(&self, path: impl AsRef<Path>) -> Result<Arc<Snapshot>> {
        self.reload(&read_source(path.as_ref())?)
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        SentryError::ConfigLoad(format!("read policy {} failed: {e}", path.display()))
    })
}

/// Current wall clock in unix seconds (expiry reference).
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AB: &str = r#"
default: block
entries:
  - { key: a, decision: allow }
  - { key: b, decision: block }
rules:
  - { pattern: '\.xxx$', decision: redirect, value: safe.example.com }
"#;

    #[test]
    fn exact_entries_beat_rules() {
        let store = PolicyStore::from_source(AB).unwrap();
        let snap = store.current();
        assert_eq!(snap.generation(), 1);
        assert_eq!(snap.matching("a", 0).unwrap().action(), &Action::Decide(Decision::Allow));
        assert_eq!(
            snap.resolve("site.xxx", 0).decision,
            Some(&Decision::Redirect("safe.example.com".into()))
        );
        assert!(snap.matching("c", 0).is_none());
        assert_eq!(snap.default_decision(), &Decision::Block);
    }

    const REWRITES: &str = r#"
default: block
entries:
  - { key: a, decision: allow, log: true }
  - { key: www.a, decision: rewrite, value: a, expires_at: 500 }
  - { key: hop1, decision: rewrite, value: hop2 }
  - { key: hop2, decision: rewrite, value: a }
  - { key: lost, decision: rewrite, value: nowhere }
rules:
  - { pattern: '^mirror\.', decision: rewrite, value: www.a }
"#;

    #[test]
    fn rewrite_resolves_the_new_key_once() {
        let store = PolicyStore::from_source(REWRITES).unwrap();
        let snap = store.current();

        let r = snap.resolve("www.a", 0);
        assert_eq!(r.decision, Some(&Decision::Allow));
        assert_eq!(r.rewritten_to, Some("a"));
        assert!(r.log);
        assert_eq!(r.expires_at, Some(500));

        // rules can rewrite too, but a rewrite never leads to another rewrite
        let r = snap.resolve("mirror.example", 0);
        assert_eq!(r.rewritten_to, Some("www.a"));
        assert_eq!(r.decision, None);
        assert_eq!(snap.resolve("hop1", 0).decision, None);
    }

    #[test]
    fn rewrite_to_unknown_key_gets_the_default() {
        let store = PolicyStore::from_source(REWRITES).unwrap();
        let current = store.current();
        let r = current.resolve("lost", 0);
        assert_eq!(r.decision, None);
        assert_eq!(r.rewritten_to, Some("nowhere"));
        assert!(!r.log);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let store = PolicyStore::from_source(
            "entries: [{ key: old, decision: block, expires_at: 100 }]",
        )
        .unwrap();
        let snap = store.current();
        assert!(snap.get("old", 99).is_some());
        assert!(snap.get("old", 100).is_none());
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let store = PolicyStore::from_source(AB).unwrap();
        let err = store.reload("entries: [{ key: '', decision: allow }]").unwrap_err();
        assert_eq!(err.kind().as_str(), "CONFIG_LOAD");

        let snap = store.current();
        assert_eq!(snap.generation(), 1);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = PolicyStore::load_file("/no/such/policy.yaml").unwrap_err();
        assert_eq!(err.kind().as_str(), "CONFIG_LOAD");
    }

    #[test]
    fn reload_swaps_whole_snapshot() {
        let store = PolicyStore::from_source(AB).unwrap();
        let before = store.current();

        store.reload("entries: [{ key: z, decision: allow }]").unwrap();
        let after = store.current();

        assert_eq!(after.generation(), 2);
        assert!(after.get("a", 0).is_none());
        assert!(after.get("z", 0).is_some());
        // old readers keep their consistent view
        assert!(before.get("a", 0).is_some());
        assert!(before.get("z", 0).is_none());
    }
}
