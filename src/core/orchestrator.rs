//! 编排器：把一个提示词并发分发给多个 Agent 并汇总结果
//!
//! 四个阶段：
//! 1. 并发初始化（每个 Agent 一个 tokio 任务，按请求顺序 join）；失败的直接记为错误结果
//! 2. 对初始化成功的 Agent 并发提交（各自在重试执行器内）
//! 3. 按请求顺序合并两阶段的结果
//! 4. 并发关闭所有已启动的 Agent；关闭失败只记日志，不影响结果
//!
//! 单个 Agent 的失败从不向外传播；只有非法输入与「零个 Agent 可用」是整次调用的错误。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::agent::{Agent, AgentDescriptor, AgentRegistry, Timeouts};
use crate::core::request::resolve_descriptors;
use crate::core::{
    AgentError, AgentOutcome, AgentPhase, AggregateResult, ErrorClassifier, HiveError,
    PromptRequest, RetryPolicy, SessionSetupOutcome,
};
use crate::driver::BrowserEngine;
use crate::observability::{LogBuffer, LogLevel};
use crate::session::SessionStore;

/// 未被请求覆盖时使用的默认值
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
    /// 成功问答后刷新保存的会话
    pub persist_sessions: bool,
}

pub struct Orchestrator {
    registry: AgentRegistry,
    descriptors: Vec<AgentDescriptor>,
    engine: Arc<dyn BrowserEngine>,
    sessions: Arc<dyn SessionStore>,
    classifier: Arc<ErrorClassifier>,
    settings: OrchestratorSettings,
    log: Arc<LogBuffer>,
}

impl Orchestrator {
    pub fn new(
        registry: AgentRegistry,
        engine: Arc<dyn BrowserEngine>,
        sessions: Arc<dyn SessionStore>,
        settings: OrchestratorSettings,
        log: Arc<LogBuffer>,
    ) -> Self {
        let descriptors = registry.all();
        Self {
            registry,
            descriptors,
            engine,
            sessions,
            classifier: Arc::new(ErrorClassifier::new()),
            settings,
            log,
        }
    }

    pub fn list_agents(&self) -> &[AgentDescriptor] {
        &self.descriptors
    }

    pub fn log(&self) -> &Arc<LogBuffer> {
        &self.log
    }

    fn build_agent(&self, descriptor: Arc<AgentDescriptor>, timeouts: Timeouts) -> Agent {
        Agent::new(
            descriptor,
            self.engine.clone(),
            self.sessions.clone(),
            timeouts,
        )
        .with_classifier(self.classifier.clone())
        .with_session_persistence(self.settings.persist_sessions)
    }

    pub async fn run_prompt(&self, request: PromptRequest) -> Result<AggregateResult, HiveError> {
        let descriptors = request.validate(&self.registry)?;
        let timeouts = request.effective_timeouts(&self.settings.timeouts);
        let policy = request.effective_policy(&self.settings.retry);
        let count = descriptors.len();

        self.log.append(
            LogLevel::Info,
            None,
            format!("dispatching prompt to {count} agent(s)"),
        );
        let started = Instant::now();

        // 阶段 1：并发初始化
        let handles: Vec<_> = descriptors
            .iter()
            .map(|d| {
                let mut agent = self.build_agent(d.clone(), timeouts.clone());
                self.log.info(&d.id, "initializing");
                tokio::spawn(async move {
                    let _ = agent.initialize().await;
                    agent
                })
            })
            .collect();

        let mut agents: Vec<Option<Agent>> = Vec::with_capacity(count);
        let mut outcomes: Vec<Option<AgentOutcome>> = vec![None; count];
        for (i, joined) in join_all(handles).await.into_iter().enumerate() {
            let descriptor = &descriptors[i];
            match joined {
                Ok(agent) if agent.phase() == AgentPhase::Ready => {
                    self.log.info(&descriptor.id, "ready");
                    agents.push(Some(agent));
                }
                Ok(agent) => {
                    let outcome = agent.outcome();
                    self.record_failure(&outcome);
                    outcomes[i] = Some(outcome);
                    agents.push(Some(agent));
                }
                Err(e) => {
                    let outcome = self.panicked(descriptor, &e, started.elapsed());
                    outcomes[i] = Some(outcome);
                    agents.push(None);
                }
            }
        }

        let ready: Vec<usize> = (0..count).filter(|&i| outcomes[i].is_none()).collect();
        if ready.is_empty() {
            warn!("All {} agent(s) failed to initialize", count);
            self.log.append(LogLevel::Error, None, "no agents available");
            self.cleanup(&mut agents).await;
            return Err(HiveError::NoAgentsAvailable);
        }

        // 阶段 2：并发提交
        let prompt: Arc<str> = Arc::from(request.prompt.as_str());
        let mut handles = Vec::with_capacity(ready.len());
        for &i in &ready {
            let Some(mut agent) = agents[i].take() else {
                continue;
            };
            let prompt = prompt.clone();
            let policy = policy.clone();
            self.log.info(agent.id(), "submitting prompt");
            handles.push((
                i,
                tokio::spawn(async move {
                    let _ = agent.submit_prompt(&prompt, &policy).await;
                    agent
                }),
            ));
        }
        let (indices, handles): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
        for (i, joined) in indices.into_iter().zip(join_all(handles).await) {
            let descriptor = &descriptors[i];
            match joined {
                Ok(agent) => {
                    let outcome = agent.outcome();
                    if outcome.is_success() {
                        self.log.info(
                            &descriptor.id,
                            format!(
                                "succeeded in {}ms after {} retr(ies)",
                                outcome.elapsed_ms, outcome.retry_count
                            ),
                        );
                    } else {
                        self.record_failure(&outcome);
                    }
                    outcomes[i] = Some(outcome);
                    agents[i] = Some(agent);
                }
                Err(e) => {
                    outcomes[i] = Some(self.panicked(descriptor, &e, started.elapsed()));
                }
            }
        }
        let total = started.elapsed();

        // 阶段 3：按请求顺序合并
        let outcomes: Vec<AgentOutcome> = descriptors
            .iter()
            .zip(outcomes)
            .map(|(d, outcome)| {
                outcome.unwrap_or_else(|| {
                    AgentOutcome::failure(d, AgentError::unknown("agent produced no outcome"), total, 0)
                })
            })
            .collect();

        // 阶段 4：清理
        self.cleanup(&mut agents).await;

        let result = AggregateResult::new(outcomes, total);
        info!(
            run_id = %result.run_id,
            success = result.success_count,
            error = result.error_count,
            total_ms = result.total_duration_ms,
            "Prompt dispatched"
        );
        self.log.append(
            LogLevel::Info,
            None,
            format!(
                "run {} finished: {} succeeded, {} failed",
                result.run_id, result.success_count, result.error_count
            ),
        );
        Ok(result)
    }

    /// 交互式建立会话：空列表表示全部启用的 Agent
    pub async fn setup_sessions(
        &self,
        agent_ids: &[String],
    ) -> Result<Vec<SessionSetupOutcome>, HiveError> {
        let ids = if agent_ids.is_empty() {
            self.registry.enabled_ids()
        } else {
            agent_ids.to_vec()
        };
        if ids.is_empty() {
            return Err(HiveError::InvalidRequest("no agents selected".to_string()));
        }
        let descriptors = resolve_descriptors(&ids, &self.registry)?;

        let handles: Vec<_> = descriptors
            .iter()
            .map(|d| {
                let mut agent = self.build_agent(d.clone(), self.settings.timeouts.clone());
                self.log.info(&d.id, "setting up session");
                tokio::spawn(async move {
                    let result = agent.establish_session().await;
                    (agent, result)
                })
            })
            .collect();

        let mut agents = Vec::with_capacity(descriptors.len());
        let mut results = Vec::with_capacity(descriptors.len());
        for (descriptor, joined) in descriptors.iter().zip(join_all(handles).await) {
            let result = match joined {
                Ok((agent, result)) => {
                    agents.push(Some(agent));
                    result
                }
                Err(e) => Err(AgentError::unknown(format!("agent task failed: {e}"))),
            };
            match &result {
                Ok(()) => self.log.info(&descriptor.id, "session saved"),
                Err(e) => self.log.error(&descriptor.id, format!("session setup failed: {e}")),
            }
            results.push(SessionSetupOutcome::new(descriptor, result));
        }

        self.cleanup(&mut agents).await;
        Ok(results)
    }

    /// 关闭所有已启动的 Agent
    async fn cleanup(&self, agents: &mut [Option<Agent>]) {
        let closing = agents
            .iter_mut()
            .flatten()
            .filter(|agent| agent.phase().has_started())
            .map(|agent| async move {
                agent.close().await;
                self.log.append(LogLevel::Debug, Some(agent.id()), "closed");
            });
        join_all(closing).await;
    }

    fn record_failure(&self, outcome: &AgentOutcome) {
        let message = outcome
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "failed".to_string());
        self.log.error(&outcome.agent_id, message);
    }

    fn panicked(&self, descriptor: &AgentDescriptor, e: &JoinError, elapsed: Duration) -> AgentOutcome {
        warn!(agent = %descriptor.id, "Agent task failed: {}", e);
        let outcome = AgentOutcome::failure(
            descriptor,
            AgentError::unknown(format!("agent task failed: {e}")),
            elapsed,
            0,
        );
        self.record_failure(&outcome);
        outcome
    }
}
