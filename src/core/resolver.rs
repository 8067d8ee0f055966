//! 元素定位回退
//!
//! 同一逻辑控件（如聊天输入框）在不同前端上的标记不同，按顺序尝试候选定位器。
//! 总超时平均分给每个候选，整次调用不会超过调用方给的预算，与候选数量无关。

use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::core::AgentError;
use crate::driver::{Locator, PageDriver};

#[derive(Debug, Clone, Copy, Default)]
pub struct ElementResolver;

impl ElementResolver {
    pub fn new() -> Self {
        Self
    }

    /// 返回第一个在其份额内出现的定位器；全部失败时返回 LOCATOR_NOT_FOUND，detail 为尝试过的列表
    pub async fn resolve(
        &self,
        driver: &dyn PageDriver,
        locators: &[Locator],
        total_timeout: Duration,
    ) -> Result<Locator, AgentError> {
        let attempted = || {
            locators
                .iter()
                .map(Locator::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        if locators.is_empty() {
            return Err(AgentError::locator_not_found("no candidate locators"));
        }

        let count = u32::try_from(locators.len()).unwrap_or(u32::MAX);
        let share = total_timeout / count;

        for locator in locators {
            // 驱动自身超时不可靠时，仍以份额为硬上限
            match timeout(share, driver.wait_for_locator(locator, share)).await {
                Ok(Ok(())) => {
                    debug!(locator = %locator, "Locator resolved");
                    return Ok(locator.clone());
                }
                Ok(Err(e)) => debug!(locator = %locator, "Locator not resolved: {}", e),
                Err(_) => debug!(locator = %locator, share_ms = share.as_millis() as u64, "Locator probe hit its share"),
            }
        }

        Err(AgentError::locator_not_found(format!(
            "none of {} locators resolved within {}ms",
            locators.len(),
            total_timeout.as_millis()
        ))
        .with_detail(attempted()))
    }
}
