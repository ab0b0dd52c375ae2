//! Top-level facade crate for Sentry.
//!
//! Re-exports the protocol core, the lookup server and the benchmark harness
//! so users can depend on a single crate.

pub mod core {
    pub use sentry_core::*;
}

pub mod server {
    pub use sentry_server::*;
}

pub mod bench {
    pub use sentry_bench::*;
}
