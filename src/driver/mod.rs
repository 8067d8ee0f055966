//! 页面自动化驱动抽象
//!
//! 核心只通过 PageDriver 操作页面（导航、等待元素、点击、填写、读文本），
//! BrowserEngine 是所有 Agent 共享的只读句柄，只负责打开彼此隔离的新会话。
//! 错误一律是原始文本，由 ErrorClassifier 统一分类。
//!
//! - mock：脚本化的内存实现（测试与本地演练）
//! - chrome：Headless Chrome 实现，需启用 feature "browser"

pub mod mock;

#[cfg(feature = "browser")]
pub mod chrome;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::SessionHandle;

pub use mock::{MockBrowserEngine, MockPage, PageScript};

#[cfg(feature = "browser")]
pub use chrome::{ChromeEngine, ChromeOptions};

/// 页面元素的抽象引用（通常是 CSS 选择器），对核心不透明
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 单个隔离会话上的页面操作能力
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), String>;

    /// 等待页面进入稳定/空闲状态
    async fn wait_ready(&self, timeout: Duration) -> Result<(), String>;

    /// 在 timeout 内等待元素出现
    async fn wait_for_locator(&self, locator: &Locator, timeout: Duration) -> Result<(), String>;

    async fn click(&self, locator: &Locator) -> Result<(), String>;

    /// 替换输入框内容；text 为空即清空
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), String>;

    /// 所有匹配元素的文本（文档顺序），无匹配时返回空列表而非错误
    async fn query_all_text(&self, locator: &Locator) -> Result<Vec<String>, String>;

    /// 最后一个匹配元素的文本，无匹配时返回 None
    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, String>;

    /// 导出当前会话状态（cookies 等），供 SessionStore 持久化
    async fn snapshot_session(&self) -> Result<SessionHandle, String>;

    /// 释放会话资源
    async fn close(&self) -> Result<(), String>;
}

/// 共享的自动化引擎：并发安全地打开新的隔离会话
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn open_session(
        &self,
        agent_id: &str,
        restore: Option<SessionHandle>,
    ) -> Result<Box<dyn PageDriver>, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_serializes_as_plain_string() {
        let loc = Locator::new("textarea#prompt-textarea");
        assert_eq!(
            serde_json::to_string(&loc).unwrap(),
            "\"textarea#prompt-textarea\""
        );
        let back: Locator = serde_json::from_str("\"div.answer\"").unwrap();
        assert_eq!(back.as_str(), "div.answer");
    }
}
