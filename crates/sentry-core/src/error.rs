//! Shared error type across Sentry crates.

use serde::Serialize;
use thiserror::Error;

/// Stable error kinds (wire codes and structured log fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed configuration / policy source.
    ConfigLoad,
    /// Malformed client frame.
    Protocol,
    /// Benchmark target could not be reached.
    TargetUnreachable,
    /// A lookup round trip exceeded its deadline.
    LookupTimeout,
    /// Socket level failure.
    Io,
    /// Unexpected condition.
    Internal,
}

impl ErrorKind {
    /// String representation used in logs, metrics and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConfigLoad => "CONFIG_LOAD",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::TargetUnreachable => "TARGET_UNREACHABLE",
            ErrorKind::LookupTimeout => "LOOKUP_TIMEOUT",
            ErrorKind::Io => "IO",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// One-byte code carried in error frames.
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::ConfigLoad => 1,
            ErrorKind::Protocol => 2,
            ErrorKind::TargetUnreachable => 3,
            ErrorKind::LookupTimeout => 4,
            ErrorKind::Io => 5,
            ErrorKind::Internal => 6,
        }
    }

    /// Inverse of [`ErrorKind::code`]. Unknown codes map to `Internal`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ErrorKind::ConfigLoad,
            2 => ErrorKind::Protocol,
            3 => ErrorKind::TargetUnreachable,
            4 => ErrorKind::LookupTimeout,
            5 => ErrorKind::Io,
            _ => ErrorKind::Internal,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, SentryError>;

/// Unified error type used by server, benchmark and protocol code.
#[derive(Debug, Error)]
pub enum SentryError {
    #[error("config load failed: {0}")]
    ConfigLoad(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),
    #[error("lookup timed out")]
    LookupTimeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl SentryError {
    /// Map to a stable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SentryError::ConfigLoad(_) => ErrorKind::ConfigLoad,
            SentryError::Protocol(_)
            | SentryError::UnsupportedVersion(_)
            | SentryError::FrameTooLarge { .. } => ErrorKind::Protocol,
            SentryError::TargetUnreachable(_) => ErrorKind::TargetUnreachable,
            SentryError::LookupTimeout => ErrorKind::LookupTimeout,
            SentryError::Io(_) => ErrorKind::Io,
            SentryError::Internal(_) => ErrorKind::Internal,
        }
    }
}
