//! Policy document (YAML) and its compilation into snapshot parts.
//!
//! ```yaml
//! default: allow
//! entries:
//!   - { key: a, decision: allow }
//!   - { key: old.example.com, decision: redirect, value: new.example.com }
//!   - { key: www.example.com, decision: rewrite, value: example.com }
//! rules:
//!   - { pattern: '^(.*)\.xxx$', decision: block, log: true }
//! ```
//!
//! `rewrite` looks the key up again under `value`; it is not allowed as the
//! default.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;

use sentry_core::error::{Result, SentryError};
use sentry_core::protocol::Decision;

use super::store::{Action, PatternRule, PolicyEntry};

/// Largest redirect/value payload a policy may carry; answers must stay well
/// inside a client's response frame limit.
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    #[default]
    Allow,
    Block,
    Redirect,
    Value,
    Rewrite,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    #[serde(default)]
    pub default: DecisionKind,

    #[serde(default)]
    pub default_value: Option<String>,

    #[serde(default)]
    pub entries: Vec<EntrySpec>,

    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySpec {
    pub key: String,
    pub decision: DecisionKind,
    #[serde(default)]
    pub value: Option<String>,
    /// Unix seconds; the entry is ignored from that instant on.
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub log: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub pattern: String,
    pub decision: DecisionKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub log: bool,
}

/// Fully validated policy, ready to become a snapshot.
pub struct CompiledPolicy {
    pub entries: HashMap<String, PolicyEntry>,
    pub rules: Vec<PatternRule>,
    pub default: Decision,
}

pub fn parse(source: &str) -> Result<PolicyDocument> {
    serde_yaml::from_str(source)
        .map_err(|e| SentryError::ConfigLoad(format!("invalid policy yaml: {e}")))
}

pub fn compile(doc: PolicyDocument) -> Result<CompiledPolicy> {
    let default = match build_action(doc.default, doc.default_value, "default")? {
        Action::Decide(d) => d,
        Action::Rewrite(_) => {
            return Err(SentryError::ConfigLoad("default: rewrite is not a valid default".into()))
        }
    };

    let mut entries = HashMap::with_capacity(doc.entries.len());
    for e in doc.entries {
        if e.key.is_empty() {
            return Err(SentryError::ConfigLoad("policy entry with empty key".into()));
        }
        let action = build_action(e.decision, e.value, &e.key)?;
        // later entries win
        entries.insert(
            e.key.clone(),
            PolicyEntry {
                key: e.key,
                action,
                expires_at: e.expires_at,
                log: e.log,
            },
        );
    }

    let mut rules = Vec::with_capacity(doc.rules.len());
    for r in doc.rules {
        let pattern = Regex::new(&r.pattern).map_err(|e| {
            SentryError::ConfigLoad(format!("invalid rule pattern {}: {e}", r.pattern))
        })?;
        let action = build_action(r.decision, r.value, &r.pattern)?;
        rules.push(PatternRule { pattern, action, log: r.log });
    }

    Ok(CompiledPolicy { entries, rules, default })
}

fn build_action(kind: DecisionKind, value: Option<String>, ctx: &str) -> Result<Action> {
    if let Some(v) = &value {
        if v.len() > MAX_PAYLOAD_BYTES {
            return Err(SentryError::ConfigLoad(format!(
                "{ctx}: value is {} bytes (max {MAX_PAYLOAD_BYTES})",
                v.len()
            )));
        }
    }

    match (kind, value) {
        (DecisionKind::Allow, None) => Ok(Action::Decide(Decision::Allow)),
        (DecisionKind::Block, None) => Ok(Action::Decide(Decision::Block)),
        (DecisionKind::Allow | DecisionKind::Block, Some(_)) => Err(SentryError::ConfigLoad(
            format!("{ctx}: value is only valid for redirect/value/rewrite decisions"),
        )),
        (DecisionKind::Redirect, Some(dst)) if !dst.is_empty() => {
            Ok(Action::Decide(Decision::Redirect(dst)))
        }
        (DecisionKind::Redirect, _) => Err(SentryError::ConfigLoad(format!(
            "{ctx}: redirect requires a destination value"
        ))),
        (DecisionKind::Value, Some(v)) => Ok(Action::Decide(Decision::Value(v))),
        (DecisionKind::Value, None) => Err(SentryError::ConfigLoad(format!(
            "{ctx}: value decision requires a value"
        ))),
        (DecisionKind::Rewrite, Some(key)) if !key.is_empty() => Ok(Action::Rewrite(key)),
        (DecisionKind::Rewrite, _) => Err(SentryError::ConfigLoad(format!(
            "{ctx}: rewrite requires a target key"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_keep_the_last_entry() {
        let doc = parse(
            r#"
entries:
  - { key: a, decision: allow }
  - { key: a, decision: block }
"#,
        )
        .unwrap();
        let compiled = compile(doc).unwrap();
        assert_eq!(compiled.entries.len(), 1);
        assert_eq!(compiled.entries["a"].action, Action::Decide(Decision::Block));
    }

    #[test]
    fn redirect_without_destination_is_rejected() {
        let doc = parse("entries: [{ key: a, decision: redirect }]").unwrap();
        assert!(compile(doc).is_err());
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let doc = parse("rules: [{ pattern: '(unclosed', decision: block }]").unwrap();
        let err = compile(doc).err().unwrap();
        assert_eq!(err.kind().as_str(), "CONFIG_LOAD");
    }

    #[test]
    fn rewrite_needs_a_target_and_cannot_be_the_default() {
        let ok = parse("rules: [{ pattern: '^www\\.', decision: rewrite, value: example.com }]")
            .unwrap();
        let compiled = compile(ok).unwrap();
        assert_eq!(compiled.rules[0].action, Action::Rewrite("example.com".into()));

        let no_target = parse("entries: [{ key: a, decision: rewrite }]").unwrap();
        assert!(compile(no_target).is_err());

        let as_default = parse("default: rewrite\ndefault_value: a\n").unwrap();
        assert!(compile(as_default).is_err());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        let doc = parse(&format!("entries: [{{ key: a, decision: value, value: {big} }}]")).unwrap();
        let err = compile(doc).err().unwrap();
        assert_eq!(err.kind().as_str(), "CONFIG_LOAD");

        let fits = "x".repeat(MAX_PAYLOAD_BYTES);
        let doc = parse(&format!("entries: [{{ key: a, decision: value, value: {fits} }}]")).unwrap();
        assert!(compile(doc).is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse("entries: [{ key: a, decison: allow }]").is_err());
    }
}
