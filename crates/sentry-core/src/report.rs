//! Error reporting capability.
//!
//! Server and benchmark components never log their failures through a global
//! handle; they receive a `Reporter` and push structured events into it. The
//! binary plugs in [`TracingReporter`], tests plug in [`MemoryReporter`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ErrorKind, SentryError};

/// Structured error event (kind + message + where it happened).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub component: &'static str,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(component: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            component,
            message: message.into(),
        }
    }

    pub fn from_error(component: &'static str, err: &SentryError) -> Self {
        Self::new(component, err.kind(), err.to_string())
    }
}

/// Sink for structured error events.
pub trait Reporter: Send + Sync {
    fn report(&self, event: ErrorEvent);
}

/// Shared reporter handle.
pub type SharedReporter = Arc<dyn Reporter>;

/// Forwards events to `tracing` at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: ErrorEvent) {
        tracing::warn!(
            kind = event.kind.as_str(),
            component = event.component,
            message = %event.message,
            "sentry error event"
        );
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ErrorEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: ErrorEvent) {
        self.events.lock().push(event);
    }
}
