//! Error types for cache operations
//!
//! This module defines the error types for the ouroboros-cache library.
//! Most of these never reach callers of [`crate::ResilientCacheEngine`]:
//! the engine converts storage faults into misses at its boundary. They are
//! surfaced by the lower-level components (index, tiers, configuration).

use crate::resilience::CircuitBreakerError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem error while touching the persistent tier
    #[error("I/O error during {operation} on {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file could not be parsed back into a valid record
    #[error("Corrupted data in {path:?}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// The circuit breaker rejected the call without attempting it
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Build an I/O error with the operation and path that produced it
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// True for faults that should count against the circuit breaker
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Io { .. })
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

impl From<CircuitBreakerError<CacheError>> for CacheError {
    fn from(e: CircuitBreakerError<CacheError>) -> Self {
        match e {
            CircuitBreakerError::CircuitOpen { component } => CacheError::CircuitOpen { component },
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}
