//! Retry wrapper with exponential backoff

use super::types::{ExecutorError, RetryPolicy, StepExecutor, StepOutput, StepRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Wrapper that retries transient collaborator failures
///
/// Only the in-flight call is retried; a step that already completed is
/// never executed again.
pub struct RetryExecutor {
    inner: Arc<dyn StepExecutor>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(inner: Arc<dyn StepExecutor>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl StepExecutor for RetryExecutor {
    async fn execute(&self, request: &StepRequest) -> Result<StepOutput, ExecutorError> {
        let mut attempt = 0;
        loop {
            match self.inner.execute(request).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        executor = self.inner.name(),
                        step = %request.step.id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying step executor"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fixed::tests::request;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Mock executor that fails a specified number of times before succeeding
    struct FlakyExecutor {
        calls: AtomicU32,
        fail_times: u32,
        error: ExecutorError,
    }

    impl FlakyExecutor {
        fn new(fail_times: u32, error: ExecutorError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_times,
                error,
            })
        }
    }

    #[async_trait]
    impl StepExecutor for FlakyExecutor {
        async fn execute(&self, _request: &StepRequest) -> Result<StepOutput, ExecutorError> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst);
            if count < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok(StepOutput::new(
                    serde_json::json!({ "ok": true }),
                    "flaky",
                    Duration::from_millis(1),
                ))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let flaky = FlakyExecutor::new(2, ExecutorError::network("reset"));
        let executor = RetryExecutor::new(flaky.clone(), fast_policy(3));

        let output = executor.execute(&request("inventory")).await.unwrap();
        assert_eq!(output.payload["ok"], true);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let flaky = FlakyExecutor::new(10, ExecutorError::network("reset"));
        let executor = RetryExecutor::new(flaky.clone(), fast_policy(2));

        let err = executor.execute(&request("inventory")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Network { .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_non_retryable() {
        let flaky = FlakyExecutor::new(10, ExecutorError::failed("out of stock"));
        let executor = RetryExecutor::new(flaky.clone(), fast_policy(5));

        assert!(executor.execute(&request("inventory")).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_by_default() {
        let flaky = FlakyExecutor::new(1, ExecutorError::network("reset"));
        let executor = RetryExecutor::new(flaky.clone(), RetryPolicy::default());

        assert!(executor.execute(&request("inventory")).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
