//! # Resilience Module
//!
//! Fault isolation for the persistent tier. A [`CircuitBreaker`] wraps every
//! disk operation so that a failing device is bypassed after repeated errors
//! and probed again once a recovery timeout has elapsed.
//!
//! ## Usage
//!
//! ```rust
//! use ouroboros_cache::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     recovery_timeout: Duration::from_secs(30),
//!     success_threshold: 2,
//! };
//!
//! let breaker = CircuitBreaker::new("warm_tier", config);
//!
//! let value = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerSnapshot, CircuitState};
pub use config::CircuitBreakerConfig;
