//! 请求路径上的有限重试
//!
//! 只重试调用方判定为瞬时的错误（存储超时、网关不可达），其余错误原样返回。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// 指数退避参数，由 `RetryConfig::to_policy` 构造
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 不含首次执行
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 第 `retry` 次重试前的等待（从 0 计），不超过 `max_delay`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let ms = self.initial_delay.as_millis() as f64 * factor;
        if ms.is_finite() && ms < self.max_delay.as_millis() as f64 {
            Duration::from_millis(ms as u64)
        } else {
            self.max_delay
        }
    }
}

/// 执行 `operation`，对 `is_retryable` 认可的错误按策略退避重试
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    info!(operation = operation_name, retries, "重试后成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) || retries >= policy.max_retries {
            if retries > 0 {
                warn!(operation = operation_name, retries, error = %err, "重试结束仍失败");
            }
            return Err(err);
        }

        let delay = policy.backoff(retries);
        warn!(
            operation = operation_name,
            retry = retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "瞬时错误，退避后重试"
        );
        tokio::time::sleep(delay).await;
        retries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum VerifyError {
        StoreTimeout,
        BadSignature,
    }

    impl std::fmt::Display for VerifyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn is_transient(e: &VerifyError) -> bool {
        *e == VerifyError::StoreTimeout
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_store_timeout_retried_until_verified() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_policy(&fast(3), "verify_payment", is_transient, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VerifyError::StoreTimeout)
            } else {
                Ok("completed")
            }
        })
        .await;

        assert_eq!(result, Ok("completed"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bad_signature_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_with_policy(&fast(3), "verify_payment", is_transient, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VerifyError::BadSignature)
        })
        .await;

        assert_eq!(result, Err(VerifyError::BadSignature));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistent_timeout_returns_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_with_policy(&fast(2), "verify_payment", is_transient, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VerifyError::StoreTimeout)
        })
        .await;

        assert_eq!(result, Err(VerifyError::StoreTimeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_with_policy(&fast(0), "verify_payment", is_transient, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VerifyError::StoreTimeout)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
