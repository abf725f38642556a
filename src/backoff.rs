// ABOUTME: Retry delay policies for the sync loop
// ABOUTME: Injectable so tests can simulate many cycles without wall-clock waits

use std::future::Future;
use std::time::Duration;

use crate::error::ReplicateError;

/// Delay schedule applied between retries of a failed operation.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Same delay before every retry.
    Fixed { delay: Duration },
    /// Delay doubles per retry, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt);
                initial.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Retry an async operation up to `max_attempts` times, sleeping per the
/// policy between attempts. Returns the last error once attempts are
/// exhausted. A `max_attempts` of 0 is treated as 1.
pub async fn retry_with_policy<F, Fut, T>(
    policy: &BackoffPolicy,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, ReplicateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ReplicateError>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt,
                    attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = BackoffPolicy::Fixed {
            delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(7), Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_delay_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::Fixed {
            delay: Duration::ZERO,
        };

        let result = retry_with_policy(&policy, 5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ReplicateError::Persistence("unreachable".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error_when_exhausted() {
        let policy = BackoffPolicy::Fixed {
            delay: Duration::ZERO,
        };

        let result: Result<(), _> = retry_with_policy(&policy, 3, || async {
            Err(ReplicateError::Persistence("still down".into()))
        })
        .await;

        assert!(matches!(result, Err(ReplicateError::Persistence(_))));
    }
}
