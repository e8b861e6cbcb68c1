//! 指数退避
//!
//! 消费循环在拉取失败、死信写入失败后按它计算等待时间；
//! 死信写入端用 [`retry_transient`] 重试代理的瞬时故障。

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// 退避策略
///
/// 等待时间从 `initial_delay` 起每次失败翻倍，不超过 `max_delay`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次执行之外最多再尝试的次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// 只指定初始等待，次数与上限取默认值
    pub fn with_initial_delay(initial_delay: Duration) -> Self {
        let defaults = Self::default();
        Self::new(defaults.max_retries, initial_delay, defaults.max_delay)
    }

    /// 连续失败 `failures` 次（从 0 计）之后应等待的时长
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 执行 `operation`，遇到可重试错误时按策略退避后再试
///
/// 不可重试的错误与用尽次数后的最后一次错误原样返回。
pub async fn retry_transient<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && failures < policy.max_retries => {
                let delay = policy.delay_for_attempt(failures);
                failures += 1;
                warn!(
                    operation = operation_name,
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "瞬时故障，退避后重试"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlogError;
    use parking_lot::Mutex;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = RetryPolicy::new(5, ms(100), ms(500));
        let delays: Vec<u64> = (0..5)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_long_failure_streak_stays_at_cap() {
        let policy = RetryPolicy::with_initial_delay(ms(250));
        assert_eq!(policy.delay_for_attempt(40), policy.max_delay);
        assert_eq!(policy.delay_for_attempt(u32::MAX), policy.max_delay);
    }

    #[test]
    fn test_cap_never_below_initial_delay() {
        let policy = RetryPolicy::new(1, ms(800), ms(10));
        assert_eq!(policy.delay_for_attempt(0), ms(800));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Mutex::new(0u32);
        let result = retry_transient(&RetryPolicy::new(3, ms(1), ms(2)), "dlq", || {
            let attempt = {
                let mut calls = calls.lock();
                *calls += 1;
                *calls
            };
            async move {
                if attempt < 3 {
                    Err(BlogError::Kafka("队列已满".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Mutex::new(0u32);
        let result: Result<()> = retry_transient(&RetryPolicy::new(2, ms(1), ms(1)), "dlq", || {
            *calls.lock() += 1;
            async { Err(BlogError::Kafka("broker 不可用".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(BlogError::Kafka(_))));
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Mutex::new(0u32);
        let result: Result<()> = retry_transient(&RetryPolicy::new(5, ms(1), ms(1)), "dlq", || {
            *calls.lock() += 1;
            async { Err(BlogError::Serialization("非法 JSON".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock(), 1);
    }
}
