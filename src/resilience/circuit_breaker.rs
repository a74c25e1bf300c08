//! # Circuit Breaker Implementation
//!
//! Three-state failure guard (Closed, Open, HalfOpen) around an arbitrary
//! async operation. The breaker never retries and never swallows errors: a
//! failed operation's error is handed back to the caller wrapped in
//! [`CircuitBreakerError::OperationFailed`], and the caller decides how to
//! degrade.
//!
//! State transitions depend only on the counters and the time elapsed since
//! the last failure. The Open to HalfOpen transition is evaluated lazily
//! whenever the breaker is queried, so there is no background timer.

use crate::resilience::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - calls execute as probes
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors returned from [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not attempted
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed; carries the original error
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// True if the call was rejected without running
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }

    /// The operation's own error, if it ran
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitBreakerError::OperationFailed(e) => Some(e),
            CircuitBreakerError::CircuitOpen { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker for observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// Component the breaker guards
    pub name: String,
    /// Effective state at the time of the snapshot
    pub state: CircuitState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Probe successes accumulated while half-open
    pub half_open_successes: u32,
    /// Wall-clock time of the most recent counted failure
    pub last_failure_at: Option<DateTime<Utc>>,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    /// Number of Closed/HalfOpen -> Open transitions
    pub times_opened: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure_at: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
    times_opened: u64,
}

/// Circuit breaker guarding one resource
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure_at: None,
                last_failure_wall: None,
                total_successes: 0,
                total_failures: 0,
                rejected_calls: 0,
                times_opened: 0,
            }),
        }
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current effective state
    pub fn state(&self) -> CircuitState {
        let mut st = self.lock();
        self.refresh(&mut st);
        st.state
    }

    /// Non-blocking check used by callers to fail fast before doing any work
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Run `operation` under the breaker; every error counts as a failure
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_filtered(operation, |_| true).await
    }

    /// Run `operation` under the breaker, counting only the errors for which
    /// `counts_as_failure` returns true.
    ///
    /// Errors that do not count leave every counter untouched; they are still
    /// returned to the caller.
    pub async fn execute_filtered<F, Fut, T, E, P>(
        &self,
        operation: F,
        counts_as_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        if !self.try_acquire() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(),
            Err(e) => {
                if counts_as_failure(e) {
                    self.record_failure();
                } else {
                    debug!(component = %self.name, "Operation error not counted against breaker");
                }
            }
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Get a snapshot of state, counters and timestamps
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut st = self.lock();
        self.refresh(&mut st);
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            half_open_successes: st.half_open_successes,
            last_failure_at: st.last_failure_wall,
            total_successes: st.total_successes,
            total_failures: st.total_failures,
            rejected_calls: st.rejected_calls,
            times_opened: st.times_opened,
        }
    }

    /// Force the circuit open (operator action)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut st = self.lock();
        st.last_failure_at = Some(Instant::now());
        st.last_failure_wall = Some(Utc::now());
        self.transition_to_open(&mut st);
    }

    /// Force the circuit closed and clear counters (operator action)
    pub fn reset(&self) {
        warn!(component = %self.name, "Circuit breaker reset");
        let mut st = self.lock();
        st.state = CircuitState::Closed;
        st.consecutive_failures = 0;
        st.half_open_successes = 0;
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the time-driven Open -> HalfOpen transition if it is due
    fn refresh(&self, st: &mut BreakerState) {
        if st.state != CircuitState::Open {
            return;
        }
        let due = match st.last_failure_at {
            Some(at) => at.elapsed() >= self.config.recovery_timeout,
            None => true,
        };
        if due {
            st.state = CircuitState::HalfOpen;
            st.half_open_successes = 0;
            info!(
                component = %self.name,
                success_threshold = self.config.success_threshold,
                "Circuit breaker half-open (probing recovery)"
            );
        }
    }

    fn try_acquire(&self) -> bool {
        let mut st = self.lock();
        self.refresh(&mut st);
        if st.state == CircuitState::Open {
            st.rejected_calls += 1;
            debug!(component = %self.name, "Call rejected, circuit open");
            return false;
        }
        true
    }

    fn record_success(&self) {
        let mut st = self.lock();
        st.total_successes += 1;

        match st.state {
            CircuitState::Closed => {
                st.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                st.half_open_successes += 1;
                if st.half_open_successes >= self.config.success_threshold {
                    st.state = CircuitState::Closed;
                    st.consecutive_failures = 0;
                    st.half_open_successes = 0;
                    info!(
                        component = %self.name,
                        total_successes = st.total_successes,
                        "Circuit breaker closed (recovered)"
                    );
                }
            }
            CircuitState::Open => {
                // An operation admitted before the circuit opened finished late.
                debug!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    fn record_failure(&self) {
        let mut st = self.lock();
        st.total_failures += 1;
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        st.last_failure_at = Some(Instant::now());
        st.last_failure_wall = Some(Utc::now());

        match st.state {
            CircuitState::Closed => {
                if st.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut st);
                } else {
                    warn!(
                        component = %self.name,
                        consecutive_failures = st.consecutive_failures,
                        failure_threshold = self.config.failure_threshold,
                        "Guarded operation failed"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to_open(&mut st);
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_open(&self, st: &mut BreakerState) {
        st.state = CircuitState::Open;
        st.half_open_successes = 0;
        st.times_opened += 1;

        error!(
            component = %self.name,
            consecutive_failures = st.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn breaker(failure_threshold: u32, recovery_secs: u64, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout: Duration::from_secs(recovery_secs),
                success_threshold,
            },
        )
    }

    async fn fail(circuit: &CircuitBreaker) {
        let _ = circuit.execute(|| async { Err::<(), _>("io error") }).await;
    }

    async fn succeed(circuit: &CircuitBreaker) {
        let _ = circuit.execute(|| async { Ok::<_, String>(()) }).await;
    }

    #[tokio::test]
    async fn test_normal_operation() {
        let circuit = breaker(3, 30, 2);
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.execute(|| async { Ok::<_, String>("success") }).await;
        assert_eq!(result.unwrap(), "success");

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.total_successes, 1);
        assert_eq!(snapshot.total_failures, 0);
        assert!(snapshot.last_failure_at.is_none());
    }

    #[tokio::test]
    async fn test_returns_original_error() {
        let circuit = breaker(3, 30, 2);
        let result = circuit.execute(|| async { Err::<(), _>("disk full") }).await;

        match result {
            Err(CircuitBreakerError::OperationFailed(e)) => assert_eq!(e, "disk full"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let circuit = breaker(3, 30, 2);

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().consecutive_failures, 2);

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(circuit.is_open());

        let calls = AtomicUsize::new(0);
        let result = circuit
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(circuit.snapshot().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = breaker(3, 30, 2);

        fail(&circuit).await;
        fail(&circuit).await;
        succeed(&circuit).await;
        fail(&circuit).await;

        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_uncounted_errors_leave_counters_alone() {
        let circuit = breaker(1, 30, 1);

        let result = circuit
            .execute_filtered(|| async { Err::<(), _>("corrupt") }, |_| false)
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::OperationFailed("corrupt"))));

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.total_failures, 0);
        assert_eq!(snapshot.total_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_timeout_gates_half_open() {
        let circuit = breaker(3, 30, 2);
        for _ in 0..3 {
            fail(&circuit).await;
        }
        assert!(circuit.is_open());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(circuit.is_open());
        let rejected = circuit.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(rejected.unwrap_err().is_circuit_open());

        tokio::time::advance(Duration::from_secs(2)).await;
        let probe = circuit.execute(|| async { Ok::<_, String>("probe") }).await;
        assert_eq!(probe.unwrap(), "probe");
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        assert_eq!(circuit.snapshot().half_open_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_success_threshold() {
        let circuit = breaker(1, 10, 2);
        fail(&circuit).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        succeed(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        succeed(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let circuit = breaker(1, 10, 3);
        fail(&circuit).await;
        let first_failure = circuit.snapshot().last_failure_at;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        succeed(&circuit).await;
        fail(&circuit).await;

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.times_opened, 2);
        assert!(snapshot.last_failure_at >= first_failure);

        // The recovery window restarts from the half-open failure.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(circuit.is_open());
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = breaker(5, 60, 1);

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.reset();
        assert_eq!(circuit.state(), CircuitState::Closed);
    }
}
