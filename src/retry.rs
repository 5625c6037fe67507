use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` up to `1 + max_retries` times with exponential backoff between
/// attempts, logging each failure. The last error is returned once every
/// attempt has failed.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failures += 1;
                if failures > policy.max_retries {
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(failures);
                tracing::warn!(
                    "{} failed (attempt {} of {}): {}; retrying in {:?}",
                    label,
                    failures,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let mut calls = 0u32;
        let result: Result<u32, String> = with_retry(&instant_policy(), "op", || {
            calls += 1;
            async { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut calls = 0u32;
        let result: Result<&str, String> = with_retry(&instant_policy(), "op", || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(format!("transient {}", n))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let mut calls = 0u32;
        let result: Result<(), String> = with_retry(&instant_policy(), "op", || {
            calls += 1;
            let n = calls;
            async move { Err(format!("failure {}", n)) }
        })
        .await;
        assert_eq!(result, Err("failure 4".to_string()));
        // One initial attempt plus three retries.
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_delay_schedule_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
    }
}
