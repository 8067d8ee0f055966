//! 一次完整的问答交互：提交 → 等待生成完成 → 提取回复
//!
//! 整个交互作为一个单元被 RetryExecutor 包裹；重试只重复这里的步骤，不重新导航。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::agent::{AgentDescriptor, CompletionDetection, PhaseTracker, Timeouts};
use crate::core::{AgentError, AgentPhase, ElementResolver, ErrorClassifier};
use crate::driver::{Locator, PageDriver};

/// 在 limit 内执行驱动调用：原始错误交给分类器，超时归为 TIMEOUT
pub(crate) async fn within<T, F>(
    classifier: &ErrorClassifier,
    limit: Duration,
    what: &str,
    fut: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, String>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(raw)) => Err(classifier.to_error(&raw)),
        Err(_) => Err(AgentError::timeout(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// 非空文本按文档顺序用换行拼接
fn join_non_empty(texts: Vec<String>) -> String {
    texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) struct Exchange<'a> {
    pub driver: &'a dyn PageDriver,
    pub descriptor: &'a AgentDescriptor,
    pub timeouts: &'a Timeouts,
    pub classifier: &'a ErrorClassifier,
    pub phase: &'a PhaseTracker,
    pub resolver: ElementResolver,
}

impl Exchange<'_> {
    pub async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        self.phase.advance(AgentPhase::Submitting);
        self.submit(prompt).await?;

        self.phase.advance(AgentPhase::AwaitingCompletion);
        self.await_completion().await?;

        self.phase.advance(AgentPhase::Extracting);
        let text = self.extract().await?;
        if text.trim().is_empty() {
            return Err(AgentError::unknown("empty response"));
        }
        Ok(text)
    }

    async fn submit(&self, prompt: &str) -> Result<(), AgentError> {
        let element = self.timeouts.element;
        let input = self
            .resolver
            .resolve(self.driver, &self.descriptor.input, element)
            .await?;
        within(self.classifier, element, "clear input", self.driver.fill(&input, "")).await?;
        within(self.classifier, element, "fill input", self.driver.fill(&input, prompt)).await?;

        let submit = self
            .resolver
            .resolve(self.driver, &self.descriptor.submit, element)
            .await?;
        within(self.classifier, element, "click submit", self.driver.click(&submit)).await?;
        debug!(agent = %self.descriptor.id, "Prompt submitted");
        Ok(())
    }

    /// 轮询上限 = 回复等待预算 / 轮询间隔；截止时间从 settle 结束起算
    async fn await_completion(&self) -> Result<(), AgentError> {
        if !self.timeouts.settle.is_zero() {
            sleep(self.timeouts.settle).await;
        }
        let deadline = Instant::now() + self.timeouts.response;
        let interval = self.timeouts.clamped_poll_interval();
        let max_polls = self.timeouts.max_polls();

        let (read_text, needed) = match &self.descriptor.completion {
            CompletionDetection::IndicatorAbsent => (false, 0),
            CompletionDetection::TextStable { stable_polls } => (true, (*stable_polls).max(1)),
        };
        let mut last: Option<String> = None;
        let mut stable = 0u32;

        for poll in 0..max_polls {
            if poll > 0 {
                sleep(interval).await;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let polled = within(
                self.classifier,
                remaining,
                "completion poll",
                self.poll_once(read_text),
            )
            .await?;

            let Some(current) = polled else {
                stable = 0;
                last = None;
                continue;
            };
            if !read_text {
                debug!(agent = %self.descriptor.id, poll, "Generation complete");
                return Ok(());
            }
            if !current.is_empty() && last.as_deref() == Some(current.as_str()) {
                stable += 1;
                if stable >= needed {
                    debug!(agent = %self.descriptor.id, poll, "Response text stable");
                    return Ok(());
                }
            } else {
                stable = 0;
            }
            last = Some(current);
        }

        Err(AgentError::timeout(format!(
            "response not complete after {} polls ({}ms)",
            max_polls,
            self.timeouts.response.as_millis()
        )))
    }

    /// 单次轮询：仍在生成返回 None；否则返回当前回复文本（不需要文本时为空串）
    async fn poll_once(&self, read_text: bool) -> Result<Option<String>, String> {
        for locator in &self.descriptor.in_progress {
            if !self.driver.query_all_text(locator).await?.is_empty() {
                return Ok(None);
            }
        }
        if !read_text {
            return Ok(Some(String::new()));
        }
        for locator in &self.descriptor.response_text {
            let joined = join_non_empty(self.driver.query_all_text(locator).await?);
            if !joined.is_empty() {
                return Ok(Some(joined));
            }
        }
        Ok(Some(String::new()))
    }

    /// 优先回复文本定位器（多段拼接），否则退回到最后一个回复容器的 textContent
    async fn extract(&self) -> Result<String, AgentError> {
        let primary: Option<Locator> = match self
            .resolver
            .resolve(self.driver, &self.descriptor.response_text, self.timeouts.extract)
            .await
        {
            Ok(locator) => Some(locator),
            Err(e) => {
                debug!(agent = %self.descriptor.id, "Response text locators missed: {}", e);
                None
            }
        };

        let extract = self.timeouts.extract;
        if let Some(locator) = &primary {
            let texts = within(
                self.classifier,
                extract,
                "read response",
                self.driver.query_all_text(locator),
            )
            .await?;
            let joined = join_non_empty(texts);
            if !joined.is_empty() {
                return Ok(joined);
            }
        }

        match self
            .resolver
            .resolve(self.driver, &self.descriptor.response_container, extract)
            .await
        {
            Ok(container) => {
                let text = within(
                    self.classifier,
                    extract,
                    "read response container",
                    self.driver.text_content(&container),
                )
                .await?
                .unwrap_or_default();
                Ok(text.trim().to_string())
            }
            // 文本定位器找到了但内容为空：按空回复处理
            Err(_) if primary.is_some() => Ok(String::new()),
            Err(e) => Err(AgentError::locator_not_found("response not found").with_detail(
                format!(
                    "{}; {}",
                    locator_list(&self.descriptor.response_text),
                    e.detail.unwrap_or_default()
                ),
            )),
        }
    }
}

fn locator_list(locators: &[Locator]) -> String {
    locators
        .iter()
        .map(Locator::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
