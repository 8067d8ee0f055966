//! 一次提示词请求：内容、目标 Agent、可选的超时 / 重试覆盖

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentDescriptor, AgentRegistry, Timeouts};
use crate::core::{HiveError, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOverrides {
    /// 覆盖回复等待预算（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// 覆盖重试次数（总尝试次数 = max_retries + 1）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    pub agents: Vec<String>,
    #[serde(default)]
    pub overrides: RequestOverrides,
}

impl PromptRequest {
    pub fn new<I, S>(prompt: impl Into<String>, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            agents: agents.into_iter().map(Into::into).collect(),
            overrides: RequestOverrides::default(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.overrides.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.overrides.max_retries = Some(max_retries);
        self
    }

    /// 校验并按请求顺序解析出描述
    pub fn validate(&self, registry: &AgentRegistry) -> Result<Vec<Arc<AgentDescriptor>>, HiveError> {
        if self.prompt.trim().is_empty() {
            return Err(HiveError::InvalidRequest("prompt is empty".to_string()));
        }
        if self.agents.is_empty() {
            return Err(HiveError::InvalidRequest("no agents selected".to_string()));
        }
        resolve_descriptors(&self.agents, registry)
    }

    pub fn effective_policy(&self, defaults: &RetryPolicy) -> RetryPolicy {
        match self.overrides.max_retries {
            Some(n) => defaults.clone().with_max_retries(n),
            None => defaults.clone(),
        }
    }

    pub fn effective_timeouts(&self, defaults: &Timeouts) -> Timeouts {
        let mut timeouts = defaults.clone();
        if let Some(ms) = self.overrides.timeout_ms {
            timeouts.response = Duration::from_millis(ms);
        }
        timeouts
    }
}

/// 按顺序查找 id：重复、未知、已禁用都视为非法输入
pub fn resolve_descriptors(
    ids: &[String],
    registry: &AgentRegistry,
) -> Result<Vec<Arc<AgentDescriptor>>, HiveError> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(HiveError::InvalidRequest(format!("duplicate agent id: {id}")));
        }
        let descriptor = registry
            .get(id)
            .ok_or_else(|| HiveError::InvalidRequest(format!("unknown agent id: {id}")))?;
        if !descriptor.enabled {
            return Err(HiveError::InvalidRequest(format!("agent is disabled: {id}")));
        }
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

/// 解析命令行里的 "a,b, c"，忽略空项
pub fn parse_agent_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
