use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum RoutingError {
    /// No path connects the requested assets under the given constraints
    #[error("No Route Found: {0}")]
    NoRouteFound(String),

    /// A pool cannot fill the requested input
    #[error("Insufficient Liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Excessive Price Impact: {impact_pct:.4}% exceeds limit {limit_pct:.4}%")]
    ExcessivePriceImpact { impact_pct: f64, limit_pct: f64 },

    /// Realized hop output fell below the tolerated minimum
    #[error("Slippage Exceeded on hop {hop_index}: expected at least {minimum}, realized {realized}")]
    SlippageExceeded {
        hop_index: usize,
        minimum: f64,
        realized: f64,
    },

    /// Fresh pool data moved the expected output past the drift limit
    #[error("Simulation Stale: {0}")]
    SimulationStale(String),

    /// Venue rejected the hop for a reason that may clear on retry
    #[error("Transient Execution Error: {0}")]
    ExecutionTransient(String),

    #[error("Fatal Execution Error: {0}")]
    ExecutionFatal(String),

    /// Only part of a route or plan settled. Indices refer to hops for a
    /// single route and to sub-routes for a split plan.
    #[error("Partial Fill: confirmed {confirmed:?}, not confirmed {unconfirmed:?}: {detail}")]
    PartialFill {
        confirmed: Vec<usize>,
        unconfirmed: Vec<usize>,
        detail: String,
    },

    #[error("Invalid Amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown Asset: {0}")]
    UnknownAsset(String),

    /// Pool feed failed or returned nothing usable
    #[error("Pool Data Unavailable: {0}")]
    PoolDataUnavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Config Error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for RoutingError {
    fn from(err: serde_json::Error) -> Self {
        RoutingError::PoolDataUnavailable(format!("JSON decode error: {}", err))
    }
}

impl From<anyhow::Error> for RoutingError {
    fn from(err: anyhow::Error) -> Self {
        RoutingError::PoolDataUnavailable(format!("{:#}", err))
    }
}

impl RoutingError {
    /// Determines if an error may clear without caller intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            RoutingError::NoRouteFound(_) => false,
            RoutingError::InsufficientLiquidity(_) => false,
            RoutingError::ExcessivePriceImpact { .. } => false,
            RoutingError::SlippageExceeded { .. } => false,
            RoutingError::SimulationStale(_) => true, // re-quote against the new snapshot
            RoutingError::ExecutionTransient(_) => true,
            RoutingError::ExecutionFatal(_) => false,
            RoutingError::PartialFill { .. } => false, // funds moved, caller must reconcile
            RoutingError::InvalidAmount(_) => false,
            RoutingError::UnknownAsset(_) => false,
            RoutingError::PoolDataUnavailable(_) => true,
            RoutingError::Timeout(_) => true,
            RoutingError::ConfigError(_) => false,
        }
    }

    /// Determines if the failed operation should be retried immediately.
    ///
    /// Timeouts are recoverable but never retried in place: a hop that timed
    /// out may still land, so resubmitting could double-spend.
    pub fn should_retry(&self) -> bool {
        self.is_recoverable() && matches!(self, RoutingError::ExecutionTransient(_))
    }

    /// Categorizes error for metrics and logging
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            RoutingError::NoRouteFound(_) | RoutingError::UnknownAsset(_) => {
                ErrorCategory::Routing
            }
            RoutingError::InsufficientLiquidity(_) | RoutingError::ExcessivePriceImpact { .. } => {
                ErrorCategory::Liquidity
            }
            RoutingError::SlippageExceeded { .. }
            | RoutingError::SimulationStale(_)
            | RoutingError::ExecutionTransient(_)
            | RoutingError::ExecutionFatal(_)
            | RoutingError::PartialFill { .. } => ErrorCategory::Execution,
            RoutingError::InvalidAmount(_) => ErrorCategory::Input,
            RoutingError::PoolDataUnavailable(_) => ErrorCategory::Data,
            RoutingError::Timeout(_) => ErrorCategory::Infrastructure,
            RoutingError::ConfigError(_) => ErrorCategory::Configuration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Routing,
    Liquidity,
    Execution,
    Input,
    Data,
    Infrastructure,
    Configuration,
}

/// Result of a retried operation together with the number of attempts spent
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Attempts beyond the first one
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Exponential backoff with jitter for retryable execution errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0 disables it)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(5000),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered delay before `attempt` (exponential backoff, capped)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let factor = 2_u128.saturating_pow(attempt - 1);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt, delay);
        delay
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = delay.as_secs_f64() * self.jitter * fastrand::f64();
        (delay + Duration::from_secs_f64(extra)).min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is spent. Exhausting the attempts on a retryable
    /// error turns it into `ExecutionFatal`.
    pub async fn run<F, T, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                sleep(self.jittered_delay(attempt)).await;
            }

            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    };
                }
                Err(e) if e.should_retry() => {
                    warn!("Attempt {} failed: {} (retrying...)", attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }
            }
        }

        error!("All {} retry attempts failed", max_attempts);
        let cause = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        RetryOutcome {
            result: Err(RoutingError::ExecutionFatal(format!(
                "retries exhausted after {} attempts: {}",
                max_attempts, cause
            ))),
            attempts: max_attempts,
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
            .with_jitter(0.0)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(0));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_millis(350));
    }

    #[test]
    fn test_only_transient_errors_retry() {
        assert!(RoutingError::ExecutionTransient("blockhash expired".into()).should_retry());
        assert!(!RoutingError::ExecutionFatal("bad account".into()).should_retry());
        assert!(!RoutingError::Timeout("confirmation".into()).should_retry());
        assert!(RoutingError::Timeout("confirmation".into()).is_recoverable());
        assert_eq!(
            RoutingError::SimulationStale("drift".into()).categorize(),
            ErrorCategory::Execution
        );
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let outcome = fast_policy(3)
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RoutingError::ExecutionTransient("busy".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_becomes_fatal() {
        let outcome: RetryOutcome<()> = fast_policy(2)
            .run(|| async { Err(RoutingError::ExecutionTransient("busy".into())) })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(outcome.result, Err(RoutingError::ExecutionFatal(_))));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = fast_policy(5)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RoutingError::ExecutionFatal("rejected".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.result,
            Err(RoutingError::ExecutionFatal("rejected".into()))
        );
    }
}
