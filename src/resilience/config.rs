//! Circuit breaker configuration

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time to stay open before letting a probe through
    pub recovery_timeout: Duration,

    /// Number of probe successes in half-open state required to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Configuration tuned for local disk storage
    pub fn for_disk() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(CacheError::ConfigError(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.recovery_timeout.is_zero() {
            return Err(CacheError::ConfigError(
                "recovery_timeout must be greater than 0".to_string(),
            ));
        }

        if self.success_threshold == 0 {
            return Err(CacheError::ConfigError(
                "success_threshold must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
