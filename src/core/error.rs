//! 错误类型：单个 Agent 的分类错误与整次调用的致命错误
//!
//! AgentError 只会变成 AgentOutcome 里的 error 字段，不会越过 Orchestrator 向外传播；
//! HiveError 仅在输入非法、零个 Agent 初始化成功或配置加载失败时返回给调用方。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误分类（封闭集合），序列化为 NETWORK / LOCATOR_NOT_FOUND / ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    LocatorNotFound,
    Timeout,
    SessionInvalid,
    Unknown,
}

impl ErrorKind {
    /// 会话失效无法靠重试同一操作恢复，其余类型都值得再试
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::SessionInvalid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::LocatorNotFound => "LOCATOR_NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::SessionInvalid => "SESSION_INVALID",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 Agent 的分类错误：类型、可读消息、可选诊断信息（如尝试过的定位器列表）
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub recoverable: bool,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            recoverable: kind.is_recoverable(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn locator_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LocatorNotFound, message)
    }

    pub fn session_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionInvalid, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

/// 整次调用的致命错误（与任何单 Agent 错误区分开）
#[derive(Error, Debug)]
pub enum HiveError {
    /// 提示词为空、Agent 列表为空、重复或未知的 Agent id
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 所有选中的 Agent 都初始化失败
    #[error("no agents available")]
    NoAgentsAvailable,

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}
