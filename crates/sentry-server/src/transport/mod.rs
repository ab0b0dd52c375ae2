//! Transport layer (TCP).
//!
//! Exposes the accept loop and the per-connection session that decodes each
//! frame once before handing it to the lookup engine.

pub mod listener;
pub mod session;

pub use listener::serve;
pub use session::CloseReason;
