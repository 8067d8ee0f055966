//! 会话存储抽象层
//!
//! 每个 Agent 一份不透明的会话数据（cookies 等），核心只关心「是否存在」与保存/恢复，
//! 数据内容由产生它的驱动实现自行解释。提供内存与文件两种实现。

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 持久化的会话数据，对核心不透明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn exists(&self, agent_id: &str) -> bool;

    async fn load(&self, agent_id: &str) -> Option<SessionHandle>;

    async fn save(&self, agent_id: &str, handle: SessionHandle) -> Result<(), String>;
}

/// 内存会话存储
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn exists(&self, agent_id: &str) -> bool {
        self.sessions.read().await.contains_key(agent_id)
    }

    async fn load(&self, agent_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(agent_id).cloned()
    }

    async fn save(&self, agent_id: &str, handle: SessionHandle) -> Result<(), String> {
        self.sessions
            .write()
            .await
            .insert(agent_id.to_string(), handle);
        Ok(())
    }
}

/// 文件会话存储：`<dir>/<agent_id>.json`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, agent_id: &str) -> PathBuf {
        // id 来自内置表，仍去掉路径分隔符避免写出目录
        let safe: String = agent_id
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn exists(&self, agent_id: &str) -> bool {
        tokio::fs::try_exists(self.path_for(agent_id))
            .await
            .unwrap_or(false)
    }

    async fn load(&self, agent_id: &str) -> Option<SessionHandle> {
        let path = self.path_for(agent_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(agent = agent_id, path = %path.display(), "Failed to read session: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<SessionHandle>(&raw) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(agent = agent_id, path = %path.display(), "Corrupt session file ignored: {}", e);
                None
            }
        }
    }

    async fn save(&self, agent_id: &str, handle: SessionHandle) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("Failed to create session dir {}: {}", self.dir.display(), e))?;
        let path = self.path_for(agent_id);
        let json = serde_json::to_string(&handle).map_err(|e| e.to_string())?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| format!("Failed to write session {}: {}", path.display(), e))?;
        tracing::debug!(agent = agent_id, path = %path.display(), "Session saved");
        Ok(())
    }
}
