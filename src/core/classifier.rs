//! 错误分类器
//!
//! 将驱动返回的原始错误文本映射为 ErrorKind，供 RetryExecutor 判断是否重试。
//! 规则按顺序匹配、先命中者胜出（规则之间并不互斥，顺序本身就是约定的一部分）。

use regex::Regex;

use crate::core::{AgentError, ErrorKind};

const TIMEOUT_PATTERN: &str = r"(?i)timed?\s*out|deadline exceeded";
const LOCATOR_PATTERN: &str = r"(?i)(selector|locator|element|node)\b.*\bnot found|no such element|could not find (element|selector|node)|not found:\s*(selector|locator)";
const NETWORK_PATTERN: &str = r"(?i)connection (refused|reset|closed|aborted)|net::err_|\bnetwork\b|\bdns\b|unreachable|\beconn\w*|socket hang up|failed to fetch";
const SESSION_PATTERN: &str = r"(?i)session (expired|invalid)|not logged in|\blog\s?in\b|\bsign\s?in\b|unauthori[sz]ed|\b401\b|authentication required";

/// 有序规则表：纯函数，同样的文本永远得到同样的分类
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<(ErrorKind, Regex)>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        let rules = [
            (ErrorKind::Timeout, TIMEOUT_PATTERN),
            (ErrorKind::LocatorNotFound, LOCATOR_PATTERN),
            (ErrorKind::Network, NETWORK_PATTERN),
            (ErrorKind::SessionInvalid, SESSION_PATTERN),
        ]
        .into_iter()
        .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("built-in pattern compiles")))
        .collect();
        Self { rules }
    }

    pub fn classify(&self, raw: &str) -> ErrorKind {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(raw))
            .map(|(kind, _)| *kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    pub fn is_retryable(kind: ErrorKind) -> bool {
        kind.is_recoverable()
    }

    /// 原始错误文本 -> 完整的 AgentError（消息保留原文）
    pub fn to_error(&self, raw: &str) -> AgentError {
        AgentError::new(self.classify(raw), raw)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
