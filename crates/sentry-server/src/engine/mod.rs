//! Lookup engine (cache + policy snapshot + default fallback).

pub mod cache;
mod engine;

pub use cache::LruCache;
pub use engine::{LookupEngine, LookupResult};
