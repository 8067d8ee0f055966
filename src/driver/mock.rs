//! Mock 驱动（用于测试，无需浏览器）
//!
//! 每个 Agent 一份 PageScript：哪些定位器能找到、各定位器返回什么文本、
//! 哪一步返回什么原始错误、生成中指示器持续多少次检查。所有调用都记入共享日志，便于断言。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::driver::{BrowserEngine, Locator, PageDriver};
use crate::session::SessionHandle;

/// 单个页面的脚本
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub open_error: Option<String>,
    pub navigate_error: Option<String>,
    pub navigate_delay: Duration,
    pub ready_error: Option<String>,
    /// 能被 wait_for_locator 立即找到的定位器
    pub present: HashSet<String>,
    /// query_all_text / text_content 返回的文本
    pub texts: HashMap<String, Vec<String>>,
    /// 生成中指示器定位器
    pub indicators: HashSet<String>,
    /// 每次提交后指示器仍存在的检查次数
    pub busy_checks: u32,
    /// 依次消费：每次点击提交失败时返回的原始错误
    pub submit_failures: VecDeque<String>,
    /// 点击成功后模拟生成耗时
    pub response_delay: Duration,
    pub close_error: Option<String>,
    pub session_data: String,
    /// 永不返回的动作："open" / "navigate" / "fill" / "click" / "close" / "snapshot" / "query:<定位器>"
    pub hangs: HashSet<String>,
    /// 直接 panic 的动作，取值同 hangs
    pub panics: HashSet<String>,
}

impl PageScript {
    pub fn new() -> Self {
        Self {
            session_data: "mock-session".to_string(),
            ..Self::default()
        }
    }

    pub fn present(mut self, locator: &str) -> Self {
        self.present.insert(locator.to_string());
        self
    }

    pub fn texts<I, S>(mut self, locator: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.present.insert(locator.to_string());
        self.texts
            .insert(locator.to_string(), texts.into_iter().map(Into::into).collect());
        self
    }

    pub fn indicator(mut self, locator: &str, busy_checks: u32) -> Self {
        self.indicators.insert(locator.to_string());
        self.busy_checks = busy_checks;
        self
    }

    pub fn fail_submit(mut self, raw: &str) -> Self {
        self.submit_failures.push_back(raw.to_string());
        self
    }

    pub fn fail_open(mut self, raw: &str) -> Self {
        self.open_error = Some(raw.to_string());
        self
    }

    pub fn fail_navigate(mut self, raw: &str) -> Self {
        self.navigate_error = Some(raw.to_string());
        self
    }

    pub fn fail_ready(mut self, raw: &str) -> Self {
        self.ready_error = Some(raw.to_string());
        self
    }

    pub fn fail_close(mut self, raw: &str) -> Self {
        self.close_error = Some(raw.to_string());
        self
    }

    pub fn navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }

    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn hang_on(mut self, action: &str) -> Self {
        self.hangs.insert(action.to_string());
        self
    }

    pub fn panic_on(mut self, action: &str) -> Self {
        self.panics.insert(action.to_string());
        self
    }

    async fn gate(&self, action: &str) {
        if self.panics.contains(action) {
            panic!("scripted panic during {action}");
        }
        if self.hangs.contains(action) {
            std::future::pending::<()>().await;
        }
    }
}

type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, entry: String) {
    if let Ok(mut j) = journal.lock() {
        j.push(entry);
    }
}

/// 按 agent id 分发脚本的引擎
#[derive(Debug, Default)]
pub struct MockBrowserEngine {
    scripts: HashMap<String, PageScript>,
    journal: Journal,
}

impl MockBrowserEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, agent_id: &str, script: PageScript) -> Self {
        self.scripts.insert(agent_id.to_string(), script);
        self
    }

    /// 全部调用记录，形如 "claude:click:button[type=submit]"
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn count(&self, agent_id: &str, action: &str) -> usize {
        let prefix = format!("{agent_id}:{action}");
        self.journal()
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl BrowserEngine for MockBrowserEngine {
    async fn open_session(
        &self,
        agent_id: &str,
        restore: Option<SessionHandle>,
    ) -> Result<Box<dyn PageDriver>, String> {
        let script = self
            .scripts
            .get(agent_id)
            .cloned()
            .ok_or_else(|| format!("no page scripted for {agent_id}"))?;
        match &restore {
            Some(h) => record(&self.journal, format!("{agent_id}:open:restore={}", h.as_str())),
            None => record(&self.journal, format!("{agent_id}:open")),
        }
        script.gate("open").await;
        if let Some(e) = &script.open_error {
            return Err(e.clone());
        }
        Ok(Box::new(MockPage::new(agent_id, script, self.journal.clone())))
    }
}

#[derive(Debug)]
struct PageState {
    script: PageScript,
    busy_remaining: u32,
}

/// 单个 Mock 页面
#[derive(Debug)]
pub struct MockPage {
    agent_id: String,
    state: Mutex<PageState>,
    journal: Journal,
}

impl MockPage {
    fn new(agent_id: &str, script: PageScript, journal: Journal) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            state: Mutex::new(PageState {
                script,
                busy_remaining: 0,
            }),
            journal,
        }
    }

    fn log(&self, entry: String) {
        record(&self.journal, format!("{}:{}", self.agent_id, entry));
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PageState) -> T) -> Result<T, String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| "mock page state poisoned".to_string())?;
        Ok(f(&mut state))
    }

    async fn gate(&self, action: &str) -> Result<(), String> {
        let script = self.with_state(|s| PageScript {
            hangs: s.script.hangs.clone(),
            panics: s.script.panics.clone(),
            ..PageScript::default()
        })?;
        script.gate(action).await;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), String> {
        self.log(format!("navigate:{url}"));
        self.gate("navigate").await?;
        let (delay, error) =
            self.with_state(|s| (s.script.navigate_delay, s.script.navigate_error.clone()))?;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<(), String> {
        self.log("wait_ready".to_string());
        match self.with_state(|s| s.script.ready_error.clone())? {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait_for_locator(&self, locator: &Locator, timeout: Duration) -> Result<(), String> {
        self.log(format!("probe:{locator}"));
        let found = self.with_state(|s| s.script.present.contains(locator.as_str()))?;
        if found {
            return Ok(());
        }
        sleep(timeout).await;
        Err(format!(
            "Timed out after {}ms waiting for selector {}",
            timeout.as_millis(),
            locator
        ))
    }

    async fn click(&self, locator: &Locator) -> Result<(), String> {
        self.log(format!("click:{locator}"));
        self.gate("click").await?;
        let (failure, delay) = self.with_state(|s| {
            let failure = s.script.submit_failures.pop_front();
            if failure.is_none() {
                s.busy_remaining = s.script.busy_checks;
            }
            (failure, s.script.response_delay)
        })?;
        if let Some(e) = failure {
            return Err(e);
        }
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), String> {
        self.log(format!("fill:{locator}:{text}"));
        self.gate("fill").await
    }

    async fn query_all_text(&self, locator: &Locator) -> Result<Vec<String>, String> {
        self.gate(&format!("query:{locator}")).await?;
        self.with_state(|s| {
            if s.script.indicators.contains(locator.as_str()) {
                if s.busy_remaining > 0 {
                    s.busy_remaining -= 1;
                    return vec![String::new()];
                }
                return Vec::new();
            }
            s.script
                .texts
                .get(locator.as_str())
                .cloned()
                .unwrap_or_default()
        })
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, String> {
        self.with_state(|s| {
            s.script
                .texts
                .get(locator.as_str())
                .and_then(|t| t.last().cloned())
        })
    }

    async fn snapshot_session(&self) -> Result<SessionHandle, String> {
        self.log("snapshot".to_string());
        self.gate("snapshot").await?;
        self.with_state(|s| SessionHandle::new(s.script.session_data.clone()))
    }

    async fn close(&self) -> Result<(), String> {
        self.log("close".to_string());
        self.gate("close").await?;
        match self.with_state(|s| s.script.close_error.clone())? {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
