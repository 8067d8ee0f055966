//! 通用 Agent 运行时
//!
//! 一个 Agent 对应一个聊天机器人的一次隔离会话，行为完全由 AgentDescriptor 决定：
//! initialize 打开会话并导航，submit_prompt 在重试执行器内完成一次问答，close 释放资源。
//! 当前阶段通过 watch 通道对外投影，便于观察进度。

pub mod descriptor;
mod interaction;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::core::{
    AgentError, AgentOutcome, AgentPhase, ElementResolver, ErrorClassifier, ErrorKind,
    RetryExecutor, RetryPolicy,
};
use crate::driver::{BrowserEngine, PageDriver};
use crate::session::SessionStore;

pub use descriptor::{builtin_descriptors, AgentDescriptor, CompletionDetection};
pub use registry::AgentRegistry;

use interaction::{within, Exchange};

/// 各等待步骤的预算
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub navigation: Duration,
    pub ready: Duration,
    /// 单个控件（输入框 / 发送按钮）的定位预算
    pub element: Duration,
    /// 等待回复生成完成的总预算
    pub response: Duration,
    pub poll_interval: Duration,
    /// 提交后首次检查前的稳定等待
    pub settle: Duration,
    pub extract: Duration,
    /// setup 模式下等待用户完成登录
    pub login: Duration,
    /// 关闭会话的上限；超时视为已关闭
    pub close: Duration,
}

/// 轮询间隔下限，避免配置为 0 时空转
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            ready: Duration::from_secs(15),
            element: Duration::from_secs(10),
            response: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            settle: Duration::from_millis(1500),
            extract: Duration::from_secs(5),
            login: Duration::from_secs(300),
            close: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    pub fn max_polls(&self) -> u32 {
        self.polls_within(self.response)
    }

    pub fn clamped_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    fn polls_within(&self, budget: Duration) -> u32 {
        let polls = budget.as_millis() / self.clamped_poll_interval().as_millis();
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

/// 阶段投影：只接受合法转换
#[derive(Debug)]
pub struct PhaseTracker {
    tx: watch::Sender<AgentPhase>,
    agent_id: String,
}

impl PhaseTracker {
    fn new(agent_id: &str) -> Self {
        let (tx, _) = watch::channel(AgentPhase::Uninitialized);
        Self {
            tx,
            agent_id: agent_id.to_string(),
        }
    }

    pub fn current(&self) -> AgentPhase {
        *self.tx.borrow()
    }

    pub fn advance(&self, next: AgentPhase) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            warn!(agent = %self.agent_id, from = %current, to = %next, "Rejected phase transition");
            return false;
        }
        debug!(agent = %self.agent_id, from = %current, to = %next, "Phase");
        self.tx.send_replace(next);
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentPhase> {
        self.tx.subscribe()
    }
}

pub struct Agent {
    descriptor: Arc<AgentDescriptor>,
    engine: Arc<dyn BrowserEngine>,
    sessions: Arc<dyn SessionStore>,
    timeouts: Timeouts,
    classifier: Arc<ErrorClassifier>,
    resolver: ElementResolver,
    persist_sessions: bool,
    driver: Option<Box<dyn PageDriver>>,
    phase: PhaseTracker,
    started_at: Option<Instant>,
    elapsed: Duration,
    attempts: u32,
    result: Option<Result<String, AgentError>>,
}

impl Agent {
    pub fn new(
        descriptor: Arc<AgentDescriptor>,
        engine: Arc<dyn BrowserEngine>,
        sessions: Arc<dyn SessionStore>,
        timeouts: Timeouts,
    ) -> Self {
        let phase = PhaseTracker::new(&descriptor.id);
        Self {
            descriptor,
            engine,
            sessions,
            timeouts,
            classifier: Arc::new(ErrorClassifier::new()),
            resolver: ElementResolver::new(),
            persist_sessions: false,
            driver: None,
            phase,
            started_at: None,
            elapsed: Duration::ZERO,
            attempts: 0,
            result: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// 成功问答后把最新会话写回存储
    pub fn with_session_persistence(mut self, enabled: bool) -> Self {
        self.persist_sessions = enabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase.current()
    }

    pub fn watch_phase(&self) -> watch::Receiver<AgentPhase> {
        self.phase.subscribe()
    }

    /// 打开隔离会话（有存档则恢复）、导航到入口并等待页面就绪
    pub async fn initialize(&mut self) -> Result<(), AgentError> {
        let current = self.phase.current();
        if current != AgentPhase::Uninitialized {
            return Err(AgentError::unknown(format!(
                "cannot initialize agent in phase {current}"
            )));
        }
        self.begin();
        info!(agent = %self.descriptor.id, url = %self.descriptor.url, "Initializing agent");

        match self.open_and_load(true).await {
            Ok(()) => {
                self.phase.advance(AgentPhase::Ready);
                info!(agent = %self.descriptor.id, "Agent ready");
                Ok(())
            }
            Err(e) => {
                self.finish(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// setup 模式：打开页面，等待用户完成登录后保存会话；结束于 Ready
    pub async fn establish_session(&mut self) -> Result<(), AgentError> {
        let current = self.phase.current();
        if current != AgentPhase::Uninitialized {
            return Err(AgentError::unknown(format!(
                "cannot set up session in phase {current}"
            )));
        }
        self.begin();
        info!(agent = %self.descriptor.id, "Setting up session");

        let result = match self.open_and_load(false).await {
            Ok(()) => match self.await_login().await {
                Ok(()) => self.save_session().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.phase.advance(AgentPhase::Ready);
                self.elapsed = self.since_start();
                info!(agent = %self.descriptor.id, "Session saved");
                Ok(())
            }
            Err(e) => {
                self.finish(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// 在重试执行器内完成一次问答；只在 Ready 阶段可用，初始化不会被重试
    pub async fn submit_prompt(
        &mut self,
        prompt: &str,
        policy: &RetryPolicy,
    ) -> Result<String, AgentError> {
        let current = self.phase.current();
        if current != AgentPhase::Ready {
            return Err(AgentError::unknown(format!(
                "cannot submit prompt in phase {current}"
            )));
        }
        let Some(driver) = self.driver.as_deref() else {
            return Err(AgentError::unknown("agent has no open session"));
        };

        let exchange = Exchange {
            driver,
            descriptor: &self.descriptor,
            timeouts: &self.timeouts,
            classifier: &self.classifier,
            phase: &self.phase,
            resolver: self.resolver,
        };
        let exchange = &exchange;
        let executor = RetryExecutor::new(policy.clone());
        let result = executor
            .run(move || exchange.run(prompt), |e: &AgentError| {
                ErrorClassifier::is_retryable(e.kind)
            })
            .await;

        match result {
            Ok(done) => {
                self.attempts = done.attempts;
                info!(
                    agent = %self.descriptor.id,
                    attempts = done.attempts,
                    chars = done.value.chars().count(),
                    "Response extracted"
                );
                self.phase.advance(AgentPhase::Succeeded);
                self.finish(Ok(done.value.clone()));
                if self.persist_sessions {
                    if let Err(e) = self.save_session().await {
                        warn!(agent = %self.descriptor.id, "Failed to refresh session: {}", e);
                    }
                }
                Ok(done.value)
            }
            Err(failed) => {
                self.attempts = failed.attempts;
                warn!(
                    agent = %self.descriptor.id,
                    attempts = failed.attempts,
                    error = %failed.last_error,
                    "Prompt failed"
                );
                self.finish(Err(failed.last_error.clone()));
                Err(failed.last_error)
            }
        }
    }

    /// 释放会话；可重复调用，任何阶段都可调用，失败只记日志
    pub async fn close(&mut self) {
        if self.phase.current() == AgentPhase::Closed {
            return;
        }
        if let Some(driver) = self.driver.take() {
            match timeout(self.timeouts.close, driver.close()).await {
                Ok(Ok(())) => debug!(agent = %self.descriptor.id, "Session closed"),
                Ok(Err(e)) => warn!(agent = %self.descriptor.id, "Failed to close session: {}", e),
                Err(_) => warn!(
                    agent = %self.descriptor.id,
                    "Close timed out after {}ms, abandoning session",
                    self.timeouts.close.as_millis()
                ),
            }
        }
        self.phase.advance(AgentPhase::Closed);
    }

    /// 本次运行的结果；尚未运行时为 UNKNOWN 错误
    pub fn outcome(&self) -> AgentOutcome {
        let retry_count = self.attempts.saturating_sub(1);
        match &self.result {
            Some(Ok(text)) => {
                AgentOutcome::success(&self.descriptor, text.clone(), self.elapsed, retry_count)
            }
            Some(Err(e)) => {
                AgentOutcome::failure(&self.descriptor, e.clone(), self.elapsed, retry_count)
            }
            None => AgentOutcome::failure(
                &self.descriptor,
                AgentError::unknown("agent did not run"),
                self.elapsed,
                0,
            ),
        }
    }

    fn begin(&mut self) {
        self.started_at = Some(Instant::now());
        self.phase.advance(AgentPhase::Initializing);
    }

    fn since_start(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn finish(&mut self, result: Result<String, AgentError>) {
        if result.is_err() {
            self.phase.advance(AgentPhase::Failed);
        }
        self.elapsed = self.since_start();
        self.result = Some(result);
    }

    async fn open_and_load(&mut self, require_login: bool) -> Result<(), AgentError> {
        let id = self.descriptor.id.as_str();
        let restore = if self.sessions.exists(id).await {
            self.sessions.load(id).await
        } else {
            debug!(agent = id, "No stored session");
            None
        };

        let driver = within(
            &self.classifier,
            self.timeouts.navigation,
            "open session",
            self.engine.open_session(id, restore),
        )
        .await?;
        // 先挂到 self 上，之后任何失败 close() 都能释放
        let driver: &dyn PageDriver = &**self.driver.insert(driver);

        within(
            &self.classifier,
            self.timeouts.navigation,
            "navigation",
            driver.navigate(&self.descriptor.url, self.timeouts.navigation),
        )
        .await?;
        within(
            &self.classifier,
            self.timeouts.ready,
            "page ready",
            driver.wait_ready(self.timeouts.ready),
        )
        .await?;

        if require_login {
            let marker = within(
                &self.classifier,
                self.timeouts.element,
                "login check",
                login_marker(driver, &self.descriptor),
            )
            .await?;
            if let Some(marker) = marker {
                return Err(AgentError::session_invalid("login required").with_detail(marker));
            }
        }
        Ok(())
    }

    async fn await_login(&self) -> Result<(), AgentError> {
        let Some(driver) = self.driver.as_deref() else {
            return Err(AgentError::unknown("agent has no open session"));
        };
        let deadline = Instant::now() + self.timeouts.login;
        let polls = self.timeouts.polls_within(self.timeouts.login);
        for poll in 0..polls {
            if poll > 0 {
                sleep(self.timeouts.clamped_poll_interval()).await;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let marker = within(
                &self.classifier,
                remaining,
                "login check",
                login_marker(driver, &self.descriptor),
            )
            .await;
            match marker {
                Ok(None) => return Ok(()),
                Ok(Some(_)) => {}
                // 等待登录期间超时按登录未完成处理
                Err(e) if e.kind == ErrorKind::Timeout => break,
                Err(e) => return Err(e),
            }
        }
        Err(AgentError::session_invalid(format!(
            "login not completed within {}ms",
            self.timeouts.login.as_millis()
        )))
    }

    async fn save_session(&self) -> Result<(), AgentError> {
        let Some(driver) = self.driver.as_deref() else {
            return Err(AgentError::unknown("agent has no open session"));
        };
        let handle = within(
            &self.classifier,
            self.timeouts.extract,
            "session snapshot",
            driver.snapshot_session(),
        )
        .await?;
        self.sessions
            .save(&self.descriptor.id, handle)
            .await
            .map_err(|e| AgentError::unknown(format!("failed to save session: {e}")))
    }
}

/// 返回第一个出现的「未登录」标记
async fn login_marker(
    driver: &dyn PageDriver,
    descriptor: &AgentDescriptor,
) -> Result<Option<String>, String> {
    for locator in &descriptor.login_required {
        if !driver.query_all_text(locator).await?.is_empty() {
            return Ok(Some(locator.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeStatus;
    use crate::driver::{MockBrowserEngine, PageScript};
    use crate::session::{MemorySessionStore, SessionHandle};

    fn descriptor() -> Arc<AgentDescriptor> {
        Arc::new(
            AgentDescriptor::new("bot", "Bot", "https://bot.example")
                .with_input(&["#missing-input", "textarea"])
                .with_submit(&["button.send"])
                .with_response_container(&[".message"])
                .with_response_text(&[".message p"])
                .with_in_progress(&[".stop"])
                .with_login_required(&["a.login"]),
        )
    }

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            navigation: Duration::from_secs(5),
            ready: Duration::from_secs(5),
            element: Duration::from_millis(200),
            response: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
            settle: Duration::from_millis(50),
            extract: Duration::from_millis(200),
            login: Duration::from_millis(500),
            close: Duration::from_millis(500),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(10),
            2.0,
            Duration::from_millis(100),
        )
    }

    fn working_page() -> PageScript {
        PageScript::new()
            .present("textarea")
            .present("button.send")
            .texts(".message p", ["The answer", "is 4"])
            .indicator(".stop", 3)
    }

    fn agent_with(engine: MockBrowserEngine) -> (Agent, Arc<MockBrowserEngine>) {
        let engine = Arc::new(engine);
        let agent = Agent::new(
            descriptor(),
            engine.clone(),
            Arc::new(MemorySessionStore::new()),
            fast_timeouts(),
        );
        (agent, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_success() {
        let (mut agent, engine) = agent_with(MockBrowserEngine::new().with_page("bot", working_page()));
        let mut phases = agent.watch_phase();

        agent.initialize().await.unwrap();
        assert_eq!(agent.phase(), AgentPhase::Ready);
        assert!(phases.has_changed().unwrap());
        assert_eq!(*phases.borrow_and_update(), AgentPhase::Ready);

        let text = agent.submit_prompt("2+2?", &policy(3)).await.unwrap();
        assert_eq!(text, "The answer\nis 4");
        assert_eq!(agent.phase(), AgentPhase::Succeeded);

        // 先清空再填写
        let journal = engine.journal();
        let fills: Vec<&String> = journal.iter().filter(|e| e.starts_with("bot:fill:")).collect();
        assert_eq!(fills, vec!["bot:fill:textarea:", "bot:fill:textarea:2+2?"]);

        let outcome = agent.outcome();
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome.session_valid);

        agent.close().await;
        assert_eq!(agent.phase(), AgentPhase::Closed);
        assert_eq!(engine.count("bot", "close"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_submit_failures() {
        let page = working_page()
            .fail_submit("connection refused")
            .fail_submit("net::ERR_CONNECTION_RESET");
        let (mut agent, engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let text = agent.submit_prompt("hi", &policy(3)).await.unwrap();
        assert_eq!(text, "The answer\nis 4");
        assert_eq!(agent.outcome().retry_count, 2);
        // 重试不重新导航
        assert_eq!(engine.count("bot", "navigate"), 1);
        assert_eq!(engine.count("bot", "click"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_invalid_is_not_retried() {
        let page = working_page().fail_submit("session expired, please log in");
        let (mut agent, engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let err = agent.submit_prompt("hi", &policy(3)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionInvalid);
        assert_eq!(engine.count("bot", "click"), 1);

        let outcome = agent.outcome();
        assert!(!outcome.session_valid);
        assert_eq!(outcome.retry_count, 0);
        assert_eq!(agent.phase(), AgentPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_an_error() {
        let page = PageScript::new()
            .present("textarea")
            .present("button.send")
            .texts(".message p", ["", "   "]);
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "empty response");
        assert_eq!(agent.outcome().status, OutcomeStatus::Error);
        assert!(agent.outcome().response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_falls_back_to_container() {
        let page = PageScript::new()
            .present("textarea")
            .present("button.send")
            .texts(".message", ["older reply", "latest reply"]);
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let text = agent.submit_prompt("hi", &policy(1)).await.unwrap();
        assert_eq!(text, "latest reply");
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_without_any_match_is_locator_not_found() {
        let page = PageScript::new().present("textarea").present("button.send");
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LocatorNotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_never_clears_times_out() {
        let page = working_page().indicator(".stop", u32::MAX);
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let start = Instant::now();
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        // 定位输入框 100ms + settle + 10 次轮询之间的 9 个间隔；最后一次轮询后不再等待
        assert!(start.elapsed() >= Duration::from_millis(1050));
        assert!(start.elapsed() < Duration::from_millis(1150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_completion_poll_times_out() {
        let page = working_page().hang_on("query:.stop");
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let start = Instant::now();
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("completion poll"));
        // 定位输入框 + settle + 回复预算，而不是无限等待
        assert!(start.elapsed() >= Duration::from_millis(1050));
        assert!(start.elapsed() < Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_click_times_out_within_element_budget() {
        let page = working_page().hang_on("click");
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let err = agent.submit_prompt("hi", &policy(2)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("click submit"));
        assert_eq!(agent.outcome().retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_extraction_read_times_out() {
        let page = working_page().hang_on("query:.message p");
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        agent.initialize().await.unwrap();
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("read response"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_is_clamped() {
        let page = working_page().indicator(".stop", u32::MAX);
        let engine = Arc::new(MockBrowserEngine::new().with_page("bot", page));
        let timeouts = Timeouts {
            poll_interval: Duration::ZERO,
            ..fast_timeouts()
        };
        assert_eq!(timeouts.max_polls(), 100);
        let mut agent = Agent::new(
            descriptor(),
            engine,
            Arc::new(MemorySessionStore::new()),
            timeouts,
        );
        agent.initialize().await.unwrap();
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_stable_detection() {
        let descriptor = Arc::new(
            (*descriptor())
                .clone()
                .with_in_progress(&[])
                .with_completion(CompletionDetection::TextStable { stable_polls: 2 }),
        );
        let engine = Arc::new(MockBrowserEngine::new().with_page("bot", working_page()));
        let mut agent = Agent::new(
            descriptor,
            engine,
            Arc::new(MemorySessionStore::new()),
            fast_timeouts(),
        );
        agent.initialize().await.unwrap();
        let start = Instant::now();
        let text = agent.submit_prompt("hi", &policy(1)).await.unwrap();
        assert_eq!(text, "The answer\nis 4");
        // settle + 两次间隔后第三次读到同样的文本
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_login_marker_marks_session_invalid() {
        let page = working_page().texts("a.login", ["Log in"]);
        let (mut agent, engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));

        let err = agent.initialize().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionInvalid);
        assert!(!err.recoverable);
        assert_eq!(agent.phase(), AgentPhase::Failed);

        // 失败后仍持有会话，close 负责释放
        agent.close().await;
        assert_eq!(engine.count("bot", "close"), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_classified() {
        let page = working_page().fail_navigate("net::ERR_CONNECTION_REFUSED");
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));
        let err = agent.initialize().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_navigation_times_out() {
        let page = working_page().navigate_delay(Duration::from_secs(60));
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));
        let err = agent.initialize().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_restores_stored_session() {
        let engine = Arc::new(MockBrowserEngine::new().with_page("bot", working_page()));
        let sessions = Arc::new(MemorySessionStore::new());
        sessions
            .save("bot", SessionHandle::new("cookie-jar"))
            .await
            .unwrap();
        let mut agent = Agent::new(descriptor(), engine.clone(), sessions, fast_timeouts());
        agent.initialize().await.unwrap();
        assert!(engine
            .journal()
            .contains(&"bot:open:restore=cookie-jar".to_string()));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_safe_before_init() {
        let (mut agent, engine) = agent_with(MockBrowserEngine::new().with_page("bot", working_page()));
        agent.close().await;
        agent.close().await;
        assert_eq!(agent.phase(), AgentPhase::Closed);
        assert_eq!(engine.count("bot", "close"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failure_does_not_change_outcome() {
        let page = working_page().fail_close("browser crashed");
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));
        agent.initialize().await.unwrap();
        agent.submit_prompt("hi", &policy(1)).await.unwrap();
        let before = agent.outcome();
        agent.close().await;
        agent.close().await;
        let after = agent.outcome();
        assert_eq!(after.status, before.status);
        assert_eq!(after.response, before.response);
        assert_eq!(after.elapsed_ms, before.elapsed_ms);
        assert_eq!(agent.phase(), AgentPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_close_is_abandoned_after_budget() {
        let page = working_page().hang_on("close");
        let (mut agent, engine) = agent_with(MockBrowserEngine::new().with_page("bot", page));
        agent.initialize().await.unwrap();
        agent.submit_prompt("hi", &policy(1)).await.unwrap();

        let start = Instant::now();
        agent.close().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(600));
        assert_eq!(agent.phase(), AgentPhase::Closed);
        assert_eq!(engine.count("bot", "close"), 1);
        assert_eq!(agent.outcome().status, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn test_submit_requires_ready() {
        let (mut agent, _engine) = agent_with(MockBrowserEngine::new().with_page("bot", working_page()));
        let err = agent.submit_prompt("hi", &policy(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(agent.phase(), AgentPhase::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_session_saves_snapshot() {
        let engine = Arc::new(MockBrowserEngine::new().with_page("bot", working_page()));
        let sessions = Arc::new(MemorySessionStore::new());
        let mut agent = Agent::new(descriptor(), engine, sessions.clone(), fast_timeouts());

        agent.establish_session().await.unwrap();
        assert_eq!(agent.phase(), AgentPhase::Ready);
        assert_eq!(
            sessions.load("bot").await.unwrap().as_str(),
            "mock-session"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_session_times_out_waiting_for_login() {
        let page = working_page().texts("a.login", ["Log in"]);
        let engine = Arc::new(MockBrowserEngine::new().with_page("bot", page));
        let sessions = Arc::new(MemorySessionStore::new());
        let mut agent = Agent::new(descriptor(), engine, sessions.clone(), fast_timeouts());

        let err = agent.establish_session().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionInvalid);
        assert!(!sessions.exists("bot").await);
    }

    #[test]
    fn test_max_polls_derived_from_budget() {
        let t = fast_timeouts();
        assert_eq!(t.max_polls(), 10);
        let t = Timeouts {
            response: Duration::from_millis(50),
            ..fast_timeouts()
        };
        assert_eq!(t.max_polls(), 1);
    }
}
