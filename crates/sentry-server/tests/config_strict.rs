#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use sentry_server::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
server:
  listen: "0.0.0.0:5300"
  idle_timout_ms: 5000 # typo should fail
policy:
  source: policy.yaml
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG_LOAD");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
policy:
  source: policy.yaml
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.server.listen, "127.0.0.1:5300");
    assert_eq!(cfg.server.lookup_timeout_ms, 1000);
    assert_eq!(cfg.cache.capacity, 4096);
    assert!(cfg.server.admin_listen.is_none());
}

#[test]
fn missing_policy_section_fails() {
    let err = config::load_from_str("version: 1\n").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG_LOAD");
}

#[test]
fn out_of_range_values_fail() {
    let bad = r#"
version: 1
server:
  lookup_timeout_ms: 0
policy:
  source: policy.yaml
"#;
    assert!(config::load_from_str(bad).is_err());

    let bad_shards = r#"
version: 1
policy:
  source: policy.yaml
cache:
  shards: 0
"#;
    assert!(config::load_from_str(bad_shards).is_err());
}

#[test]
fn unsupported_version_fails() {
    let err = config::load_from_str("version: 2\npolicy:\n  source: p.yaml\n").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG_LOAD");
}

#[test]
fn relative_policy_source_follows_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentry.yaml");
    std::fs::write(&path, "version: 1\npolicy:\n  source: rules/policy.yaml\n").unwrap();

    let cfg = config::load_from_file(&path).unwrap();
    assert_eq!(
        std::path::PathBuf::from(cfg.policy.source),
        dir.path().join("rules/policy.yaml")
    );
}

#[test]
fn missing_config_file_is_a_config_error() {
    let err = config::load_from_file("/definitely/not/here/sentry.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG_LOAD");
}

#[test]
fn oversized_cache_capacity_fails() {
    let bad = r#"
version: 1
policy:
  source: policy.yaml
cache:
  capacity: 1000000000000000
  shards: 1
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG_LOAD");

    let at_limit = format!(
        "version: 1\npolicy:\n  source: policy.yaml\ncache:\n  capacity: {}\n",
        config::schema::MAX_CACHE_CAPACITY
    );
    assert!(config::load_from_str(&at_limit).is_ok());
}
