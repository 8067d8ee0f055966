//! 结果记录：单个 Agent 的 AgentOutcome、整次调用的 AggregateResult、会话初始化结果

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentDescriptor;
use crate::core::{AgentError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent_id: String,
    pub name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
    pub elapsed_ms: u64,
    /// 尝试次数 - 1；初始化失败时为 0
    pub retry_count: u32,
    /// 仅当最终错误为 SESSION_INVALID 时为 false
    pub session_valid: bool,
    /// 产生时刻（unix 毫秒）
    pub timestamp: i64,
}

impl AgentOutcome {
    pub fn success(
        descriptor: &AgentDescriptor,
        response: String,
        elapsed: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            agent_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            status: OutcomeStatus::Success,
            response: Some(response),
            error: None,
            elapsed_ms: millis(elapsed),
            retry_count,
            session_valid: true,
            timestamp: now_millis(),
        }
    }

    pub fn failure(
        descriptor: &AgentDescriptor,
        error: AgentError,
        elapsed: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            agent_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            status: OutcomeStatus::Error,
            response: None,
            session_valid: error.kind != ErrorKind::SessionInvalid,
            error: Some(error),
            elapsed_ms: millis(elapsed),
            retry_count,
            timestamp: now_millis(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub run_id: String,
    /// 与请求顺序一致
    pub outcomes: Vec<AgentOutcome>,
    pub total_duration_ms: u64,
    pub success_count: usize,
    pub error_count: usize,
    pub timestamp: i64,
}

impl AggregateResult {
    pub fn new(outcomes: Vec<AgentOutcome>, total_duration: Duration) -> Self {
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        let error_count = outcomes.len() - success_count;
        Self {
            run_id: Uuid::new_v4().to_string(),
            outcomes,
            total_duration_ms: millis(total_duration),
            success_count,
            error_count,
            timestamp: now_millis(),
        }
    }

    pub fn outcome(&self, agent_id: &str) -> Option<&AgentOutcome> {
        self.outcomes.iter().find(|o| o.agent_id == agent_id)
    }
}

/// setup_sessions 的单 Agent 结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSetupOutcome {
    pub agent_id: String,
    pub name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
}

impl SessionSetupOutcome {
    pub fn new(descriptor: &AgentDescriptor, result: Result<(), AgentError>) -> Self {
        let (status, error) = match result {
            Ok(()) => (OutcomeStatus::Success, None),
            Err(e) => (OutcomeStatus::Error, Some(e)),
        };
        Self {
            agent_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            status,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> AgentDescriptor {
        AgentDescriptor::new("claude", "Claude", "https://claude.ai")
    }

    #[test]
    fn test_failure_tracks_session_validity() {
        let d = descriptor();
        let expired = AgentOutcome::failure(
            &d,
            AgentError::session_invalid("login required"),
            Duration::from_millis(12),
            0,
        );
        assert!(!expired.session_valid);
        assert_eq!(expired.elapsed_ms, 12);

        let flaky = AgentOutcome::failure(&d, AgentError::timeout("slow"), Duration::ZERO, 2);
        assert!(flaky.session_valid);
        assert_eq!(flaky.retry_count, 2);
    }

    #[test]
    fn test_aggregate_counts() {
        let d = descriptor();
        let result = AggregateResult::new(
            vec![
                AgentOutcome::success(&d, "hi".to_string(), Duration::ZERO, 0),
                AgentOutcome::failure(&d, AgentError::unknown("boom"), Duration::ZERO, 0),
                AgentOutcome::success(&d, "yo".to_string(), Duration::ZERO, 1),
            ],
            Duration::from_millis(1500),
        );
        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.total_duration_ms, 1500);
        assert!(Uuid::parse_str(&result.run_id).is_ok());
    }

    #[test]
    fn test_outcome_json_shape() {
        let d = descriptor();
        let ok = serde_json::to_value(AgentOutcome::success(
            &d,
            "hello".to_string(),
            Duration::from_millis(5),
            0,
        ))
        .unwrap();
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["response"], "hello");
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(AgentOutcome::failure(
            &d,
            AgentError::locator_not_found("input not found"),
            Duration::ZERO,
            0,
        ))
        .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"]["kind"], "LOCATOR_NOT_FOUND");
        assert!(err.get("response").is_none());
    }

    #[test]
    fn test_setup_outcome() {
        let d = descriptor();
        let ok = SessionSetupOutcome::new(&d, Ok(()));
        assert_eq!(ok.status, OutcomeStatus::Success);
        let failed = SessionSetupOutcome::new(&d, Err(AgentError::session_invalid("still logged out")));
        assert_eq!(failed.status, OutcomeStatus::Error);
        assert_eq!(failed.error.unwrap().kind, ErrorKind::SessionInvalid);
    }
}
