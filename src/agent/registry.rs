//! Agent 注册表
//!
//! 保存全部 AgentDescriptor（保持声明顺序），按 id 查找；配置中的 [agents.<id>] 可覆盖启用状态与地址。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::{builtin_descriptors, AgentDescriptor};
use crate::config::AgentOverride;

#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<AgentDescriptor>>,
}

impl AgentRegistry {
    pub fn new(descriptors: Vec<AgentDescriptor>) -> Self {
        Self {
            agents: descriptors.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_descriptors())
    }

    /// 应用配置覆盖；未知 id 只记警告
    pub fn with_overrides(self, overrides: &HashMap<String, AgentOverride>) -> Self {
        for id in overrides.keys() {
            if !self.agents.iter().any(|d| &d.id == id) {
                tracing::warn!(agent = %id, "Override for unknown agent ignored");
            }
        }
        let agents = self
            .agents
            .into_iter()
            .map(|d| match overrides.get(&d.id) {
                Some(o) => {
                    let mut d = (*d).clone();
                    if let Some(enabled) = o.enabled {
                        d.enabled = enabled;
                    }
                    if let Some(url) = &o.url {
                        d.url = url.clone();
                    }
                    Arc::new(d)
                }
                None => d,
            })
            .collect();
        Self { agents }
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentDescriptor>> {
        self.agents.iter().find(|d| d.id == id).cloned()
    }

    pub fn all(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(|d| (**d).clone()).collect()
    }

    pub fn enabled_ids(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
