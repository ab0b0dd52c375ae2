use serde::Deserialize;
use sentry_core::error::{Result, SentryError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SentryConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    pub policy: PolicySection,

    #[serde(default)]
    pub cache: CacheSection,
}

impl SentryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SentryError::ConfigLoad(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.policy.validate()?;
        self.cache.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Optional `/healthz`, `/readyz`, `/metrics` endpoint.
    #[serde(default)]
    pub admin_listen: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_frame_bytes: default_max_frame_bytes(),
            idle_timeout_ms: default_idle_timeout_ms(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            admin_listen: None,
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !(16..=65536).contains(&self.max_frame_bytes) {
            return Err(SentryError::ConfigLoad(
                "server.max_frame_bytes must be between 16 and 65536".into(),
            ));
        }
        if !(1000..=3_600_000).contains(&self.idle_timeout_ms) {
            return Err(SentryError::ConfigLoad(
                "server.idle_timeout_ms must be between 1000 and 3600000".into(),
            ));
        }
        if !(1..=60_000).contains(&self.lookup_timeout_ms) {
            return Err(SentryError::ConfigLoad(
                "server.lookup_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        if self.listen.trim().is_empty() {
            return Err(SentryError::ConfigLoad("server.listen must not be empty".into()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:5300".into()
}
fn default_max_frame_bytes() -> usize {
    1024
}
fn default_idle_timeout_ms() -> u64 {
    60_000
}
fn default_lookup_timeout_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    /// Policy document path. Relative paths are resolved against the config
    /// file's directory by `load_from_file`.
    pub source: String,
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(SentryError::ConfigLoad("policy.source must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// 0 disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_shards")]
    pub shards: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            shards: default_cache_shards(),
        }
    }
}

impl CacheSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=256).contains(&self.shards) {
            return Err(SentryError::ConfigLoad(
                "cache.shards must be between 1 and 256".into(),
            ));
        }
        if self.capacity > MAX_CACHE_CAPACITY {
            return Err(SentryError::ConfigLoad(format!(
                "cache.capacity must be at most {MAX_CACHE_CAPACITY}"
            )));
        }
        Ok(())
    }
}

/// Upper bound for `cache.capacity` (entries across all shards).
pub const MAX_CACHE_CAPACITY: usize = 1 << 24;

fn default_cache_capacity() -> usize {
    4096
}
fn default_cache_shards() -> usize {
    16
}
