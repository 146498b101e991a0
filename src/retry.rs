//! Retry with exponential backoff and a circuit breaker
//!
//! Both utilities are pure policy over an arbitrary async operation; neither
//! knows anything about subprocesses beyond the [`ClaudeError`] taxonomy.
//! Nothing in the client wires the breaker in by default.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use crate::error::{ClaudeError, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry attempts added on top of the initial call
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Base of the exponential growth
    pub exponential_base: f64,
    /// Scale each delay by a uniform factor in [0.5, 1.0]
    pub jitter: bool,
    /// Also retry non-zero-exit failures. Off by default: most non-zero
    /// exits are deterministic and retrying them is wasted effort.
    pub retry_execution_failures: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            retry_execution_failures: false,
        }
    }
}

impl RetryConfig {
    fn is_retryable(&self, error: &ClaudeError) -> bool {
        if matches!(error, ClaudeError::Authentication(_)) {
            return false;
        }
        if self.retry_execution_failures && matches!(error, ClaudeError::Process { .. }) {
            return true;
        }
        error.is_retryable()
    }

    /// Delay before the retry following `attempt` (zero-based), honoring a
    /// rate-limit `retry_after` hint as a floor.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exp = self.exponential_base.powi(attempt as i32);
        let mut delay = self.base_delay.mul_f64(exp).min(self.max_delay);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay = delay.mul_f64(factor);
        }
        match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}

/// Invoke `op` with exponential-backoff retry.
///
/// `op` receives the zero-based attempt number. Non-retryable errors and
/// authentication failures propagate immediately without consuming a retry;
/// exhausting the budget re-raises the last error.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    log::info!("Retry succeeded on attempt {}", attempt + 1);
                }
                return Ok(value);
            }
            Err(error) => {
                if !config.is_retryable(&error) {
                    log::debug!("Not retrying: {error}");
                    return Err(error);
                }
                if attempt >= config.max_retries {
                    log::warn!("All {} attempt(s) failed", config.max_retries + 1);
                    return Err(error);
                }

                let retry_after = match &error {
                    ClaudeError::RateLimit { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = config.delay_for(attempt, retry_after);
                log::warn!(
                    "Attempt {} failed: {error}. Retrying in {delay:?}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing; calls are rejected without invocation
    Open,
    /// Trial call permitted after the recovery timeout
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

type ErrorClassifier = Box<dyn Fn(&ClaudeError) -> bool + Send + Sync>;

/// Three-state failure isolation for any async operation.
///
/// After `failure_threshold` consecutive counted failures the breaker opens
/// and rejects calls outright until `recovery_timeout` has elapsed, then
/// permits one trial call whose outcome decides between closing and
/// re-opening.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    counts_failure: Option<ErrorClassifier>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker counting every error toward the threshold
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            counts_failure: None,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Restrict which errors count toward the threshold. Errors outside the
    /// classifier propagate without affecting breaker state.
    #[must_use]
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&ClaudeError) -> bool + Send + Sync + 'static,
    {
        self.counts_failure = Some(Box::new(classifier));
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Manually reset to closed
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.last_failure = None;
    }

    /// Execute `op` under breaker protection
    pub async fn call<T, Fut>(&self, op: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut state = self.state.lock();
            if state.state == CircuitState::Open {
                let elapsed = state
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(self.recovery_timeout);
                if elapsed < self.recovery_timeout {
                    return Err(ClaudeError::CircuitOpen {
                        recovery_timeout: self.recovery_timeout,
                    });
                }
                log::debug!("Circuit breaker OPEN -> HALF_OPEN");
                state.state = CircuitState::HalfOpen;
            }
        }

        match op.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                if self
                    .counts_failure
                    .as_ref()
                    .is_none_or(|matches| matches(&error))
                {
                    self.on_failure();
                }
                Err(error)
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        if state.state == CircuitState::HalfOpen {
            log::debug!("Circuit breaker HALF_OPEN -> CLOSED");
            state.state = CircuitState::Closed;
        }
        state.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());
        if state.failure_count >= self.failure_threshold && state.state != CircuitState::Open {
            log::warn!(
                "Circuit breaker OPEN after {} failure(s)",
                state.failure_count
            );
            state.state = CircuitState::Open;
        }
    }
}
