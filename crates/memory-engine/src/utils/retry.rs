use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{error, warn};

/// Timeout + bounded exponential backoff for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Classification of a failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth retrying: timeouts, connection failures, 429 and 5xx.
    Transient(anyhow::Error),
    /// Fails the same way every time: 4xx, malformed payloads.
    Permanent(anyhow::Error),
}

impl AttemptError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let err = anyhow::anyhow!("provider returned {}: {}", status, body);
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            AttemptError::Transient(err)
        } else {
            AttemptError::Permanent(err)
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            AttemptError::Transient(err.into())
        } else {
            AttemptError::Permanent(err.into())
        }
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent. Each attempt is bounded by `attempt_timeout`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op: &'static str,
    mut attempt: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for n in 1..=max_attempts {
        let outcome = match tokio::time::timeout(policy.attempt_timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Transient(anyhow::anyhow!(
                "{} timed out after {:?}",
                op,
                policy.attempt_timeout
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(AttemptError::Permanent(e)) => {
                error!("{} failed permanently on attempt {}: {}", op, n, e);
                return Err(e);
            }
            Err(AttemptError::Transient(e)) => {
                if n < max_attempts {
                    let delay = policy.delay_for(n);
                    warn!(
                        "{} attempt {}/{} failed: {} (retrying in {:?})",
                        op, n, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    let e = last_error.unwrap_or_else(|| anyhow::anyhow!("{} made no attempts", op));
    error!("{} failed after {} attempts: {}", op, max_attempts, e);
    Err(e.context(format!("{} failed after {} attempts", op, max_attempts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            attempt_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(30), Duration::from_millis(300));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            AttemptError::from_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            AttemptError::Transient(_)
        ));
        assert!(matches!(
            AttemptError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            AttemptError::Transient(_)
        ));
        assert!(matches!(
            AttemptError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            AttemptError::Permanent(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryPolicy::default(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(AttemptError::Transient(anyhow::anyhow!("flaky")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_with_backoff(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Permanent(anyhow::anyhow!("bad request"))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_with_backoff(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Transient(anyhow::anyhow!("down"))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let policy = RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(50),
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_with_backoff(&policy, "slow", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
