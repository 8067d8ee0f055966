//! 重试执行器：有界次数 + 指数退避（封顶）+ 可插拔的可重试判定
//!
//! 第 0 次立即执行；第 k 次（k >= 1）前等待 min(base_delay * factor^(k-1), max_delay)。
//! 没有抖动：同样的失败序列与策略得到同样的等待序列，测试里用 tokio 的暂停时钟即可精确断言。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次），0 视为 1
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay,
        }
    }

    /// 以「最多重试 n 次」覆盖尝试次数
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    fn attempts_allowed(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// 第 attempt 次（0 起）执行前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let millis = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// 成功结果：值 + 实际尝试次数 + 每次尝试前的等待
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

/// 失败结果：最后一次错误 + 实际尝试次数 + 等待序列
#[derive(Debug)]
pub struct RetryError<E> {
    pub last_error: E,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// 执行 operation；失败后若已达上限或 should_retry 返回 false 则立即停止并返回该错误
    pub async fn run<T, E, F, Fut, P>(
        &self,
        mut operation: F,
        should_retry: P,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.policy.attempts_allowed();
        let mut delays = Vec::with_capacity(max_attempts as usize);
        let mut attempt: u32 = 0;

        loop {
            let delay = self.policy.delay_for(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            delays.push(delay);
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                        delays,
                    });
                }
                Err(e) => {
                    let retryable = should_retry(&e);
                    if attempt >= max_attempts || !retryable {
                        debug!(attempt, retryable, error = %e, "Operation failed, no more retries");
                        return Err(RetryError {
                            last_error: e,
                            attempts: attempt,
                            delays,
                        });
                    }
                    warn!(
                        attempt,
                        max_attempts,
                        next_delay_ms = self.policy.delay_for(attempt).as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );
                }
            }
        }
    }
}
