//! Error types for the storage facade

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Name the engine gives to storage capacity exhaustion.
pub const QUOTA_EXCEEDED: &str = "QuotaExceededError";

/// Native error reported by the engine.
///
/// Mirrors the shape of a DOMException: a stable `name` (e.g. `ConstraintError`)
/// and a human readable `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    pub name: String,
    pub message: String,
}

impl EngineError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error signals that the engine ran out of storage.
    ///
    /// Some engines put the condition in the name, older ones only in the message.
    pub fn is_quota_exceeded(&self) -> bool {
        self.name == QUOTA_EXCEEDED || self.message == QUOTA_EXCEEDED
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for EngineError {}

/// Terminal signal that ended a request unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Error,
    Abort,
    Close,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Error => "error",
            Signal::Abort => "abort",
            Signal::Close => "close",
        })
    }
}

/// A request that settled on one of the failing terminal signals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{signal}: {error}")]
pub struct Failure {
    pub signal: Signal,
    pub error: EngineError,
}

impl Failure {
    pub fn new(signal: Signal, error: EngineError) -> Self {
        Self { signal, error }
    }
}

/// Errors surfaced by the facade
#[derive(Debug, Error)]
pub enum Error {
    /// The engine is not present in this environment
    #[error("storage engine not available: {0}")]
    NotAvailable(String),

    /// Open parameters rejected before reaching the engine
    #[error("invalid open options: {0}")]
    InvalidOptions(String),

    /// Database open or upgrade failed; carries the native error verbatim
    #[error("database open failed: {0}")]
    Open(EngineError),

    /// A transaction ended on error, abort or close
    #[error("transaction {signal}: {message}")]
    Transaction {
        signal: Signal,
        name: String,
        message: String,
    },

    /// Insert ran out of storage capacity
    #[error("Reach maximum quota")]
    QuotaExceeded,

    /// Document could not be converted to or from a typed record
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an engine error raised synchronously while issuing a request.
    pub fn thrown(error: EngineError) -> Self {
        Failure::new(Signal::Error, error).into()
    }

    /// The terminal signal behind a transaction failure, if any.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            Error::Transaction { signal, .. } => Some(*signal),
            _ => None,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Transaction {
            signal: failure.signal,
            name: failure.error.name,
            message: failure.error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detected_by_name_or_message() {
        assert!(EngineError::new("QuotaExceededError", "disk full").is_quota_exceeded());
        assert!(EngineError::new("Error", "QuotaExceededError").is_quota_exceeded());
        assert!(!EngineError::new("ConstraintError", "key exists").is_quota_exceeded());
    }

    #[test]
    fn test_failure_keeps_native_message() {
        let err: Error = Failure::new(
            Signal::Abort,
            EngineError::new("AbortError", "transaction was aborted"),
        )
        .into();

        assert_eq!(err.signal(), Some(Signal::Abort));
        assert_eq!(err.to_string(), "transaction abort: transaction was aborted");
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(
            EngineError::new("DataError", "").to_string(),
            "DataError"
        );
        assert_eq!(
            EngineError::new("DataError", "bad key").to_string(),
            "DataError: bad key"
        );
    }
}
