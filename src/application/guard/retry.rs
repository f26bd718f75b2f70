//! 指数退避重试

use std::future::Future;
use std::time::Duration;

/// 首次重试前的等待
pub const INITIAL_RETRY_DELAY_MS: u64 = 1000;
/// 退避上限
pub const MAX_RETRY_DELAY_MS: u64 = 10000;

/// 重试策略
///
/// 第 n 次重试前等待 initial_delay * 2^(n-1)，不超过 max_delay
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

/// 带调用次数的结果
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms.max(initial_delay_ms)),
        }
    }

    /// 测试用：不等待
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// 第 retry 次重试（从 1 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// 执行 op，瞬时错误按退避重试；非瞬时错误立即返回
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut op: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<Attempted<T>, Attempted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                tracing::debug!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            match op().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(e) => {
                    let retryable = is_transient(&e);
                    tracing::warn!(
                        label,
                        attempt,
                        retryable,
                        error = %e,
                        "Model call failed"
                    );
                    if !retryable || attempt > self.max_retries {
                        return Err(Attempted {
                            value: e,
                            attempts: attempt,
                        });
                    }
                }
            }
        }
    }
}
