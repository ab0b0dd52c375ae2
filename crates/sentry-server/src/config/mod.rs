//! Server config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use sentry_core::error::{Result, SentryError};

pub use schema::{CacheSection, PolicySection, SentryConfig, ServerSection};

/// Load and validate a config file. A relative `policy.source` is rewritten
/// to sit next to the config file.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<SentryConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        SentryError::ConfigLoad(format!("read config {} failed: {e}", path.display()))
    })?;
    let mut cfg = load_from_str(&s)?;

    let source = Path::new(&cfg.policy.source);
    if source.is_relative() {
        if let Some(dir) = path.parent() {
            cfg.policy.source = dir.join(source).to_string_lossy().into_owned();
        }
    }
    Ok(cfg)
}

pub fn load_from_str(s: &str) -> Result<SentryConfig> {
    let cfg: SentryConfig = serde_yaml::from_str(s)
        .map_err(|e| SentryError::ConfigLoad(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
