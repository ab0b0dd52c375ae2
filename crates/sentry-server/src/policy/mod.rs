//! Policy layer (snapshot store, exact entries, pattern rules).
//!
//! Compiles policy documents into immutable snapshots that the lookup engine
//! reads without coordinating with reloads.

pub mod source;
pub mod store;

pub use store::{
    unix_now, Action, Match, PatternRule, PolicyEntry, PolicyStore, Resolution, Snapshot,
};
