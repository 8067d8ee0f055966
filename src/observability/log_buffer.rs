//! 有界运行日志
//!
//! 由调用方创建并注入 Orchestrator，不是全局单例。超出容量时丢弃最旧的记录；
//! 每条记录同时作为 tracing 事件发出。内部锁不会跨 await 持有。

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// unix 毫秒
    pub timestamp: i64,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub message: String,
}

/// 查询条件；全部为空时返回全部记录
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// 最低级别
    pub min_level: Option<LogLevel>,
    pub agent_id: Option<String>,
    /// 只取最新的 N 条
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct LogBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, level: LogLevel, agent_id: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        let agent = agent_id.unwrap_or("-");
        match level {
            LogLevel::Debug => tracing::debug!(agent = agent, "{}", message),
            LogLevel::Info => tracing::info!(agent = agent, "{}", message),
            LogLevel::Warn => tracing::warn!(agent = agent, "{}", message),
            LogLevel::Error => tracing::error!(agent = agent, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now().timestamp_millis(),
            level,
            agent_id: agent_id.map(str::to_string),
            message,
        };
        if let Ok(mut entries) = self.entries.lock() {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    pub fn info(&self, agent_id: &str, message: impl Into<String>) {
        self.append(LogLevel::Info, Some(agent_id), message);
    }

    pub fn warn(&self, agent_id: &str, message: impl Into<String>) {
        self.append(LogLevel::Warn, Some(agent_id), message);
    }

    pub fn error(&self, agent_id: &str, message: impl Into<String>) {
        self.append(LogLevel::Error, Some(agent_id), message);
    }

    /// 按时间顺序返回匹配的记录
    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let mut matched: Vec<LogEntry> = entries
            .iter()
            .filter(|e| query.min_level.map_or(true, |min| e.level >= min))
            .filter(|e| {
                query
                    .agent_id
                    .as_deref()
                    .map_or(true, |id| e.agent_id.as_deref() == Some(id))
            })
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub fn all(&self) -> Vec<LogEntry> {
        self.query(&LogQuery::default())
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let log = LogBuffer::new(2);
        log.info("a", "one");
        log.info("a", "two");
        log.info("a", "three");
        let messages: Vec<String> = log.all().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_query_filters() {
        let log = LogBuffer::new(10);
        log.info("a", "a started");
        log.warn("b", "b retrying");
        log.error("a", "a failed");
        log.append(LogLevel::Debug, None, "run started");

        let warnings = log.query(&LogQuery {
            min_level: Some(LogLevel::Warn),
            ..LogQuery::default()
        });
        assert_eq!(warnings.len(), 2);

        let only_a = log.query(&LogQuery {
            agent_id: Some("a".to_string()),
            ..LogQuery::default()
        });
        assert_eq!(only_a.len(), 2);

        let latest = log.query(&LogQuery {
            limit: Some(1),
            ..LogQuery::default()
        });
        assert_eq!(latest[0].message, "run started");
    }

    #[test]
    fn test_clear() {
        let log = LogBuffer::new(0);
        assert_eq!(log.capacity(), 1);
        log.info("a", "x");
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }
}
