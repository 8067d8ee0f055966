//! Agent 描述：身份、入口地址与各控件的候选定位器
//!
//! 各家前端的差异全部体现在数据里，由同一个通用 Agent 算法驱动。

use serde::{Deserialize, Serialize};

use crate::driver::Locator;

/// 判断「生成完成」的策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CompletionDetection {
    /// 生成中指示器（停止按钮、加载标记）消失即完成；首次检查即不存在视为已完成
    IndicatorAbsent,
    /// 回复文本非空且连续 stable_polls 次轮询不变即完成
    TextStable { stable_polls: u32 },
}

impl Default for CompletionDetection {
    fn default() -> Self {
        CompletionDetection::IndicatorAbsent
    }
}

/// 单个聊天机器人的静态描述，运行期不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub input: Vec<Locator>,
    pub submit: Vec<Locator>,
    pub response_container: Vec<Locator>,
    pub response_text: Vec<Locator>,
    pub in_progress: Vec<Locator>,
    /// 未登录时出现的标记（登录按钮等）
    #[serde(default)]
    pub login_required: Vec<Locator>,
    #[serde(default)]
    pub completion: CompletionDetection,
}

fn default_enabled() -> bool {
    true
}

impl AgentDescriptor {
    /// 以 id / 名称 / 地址起步，定位器集合为空，用 with_* 补齐
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            enabled: true,
            input: Vec::new(),
            submit: Vec::new(),
            response_container: Vec::new(),
            response_text: Vec::new(),
            in_progress: Vec::new(),
            login_required: Vec::new(),
            completion: CompletionDetection::IndicatorAbsent,
        }
    }

    pub fn with_input(mut self, locators: &[&str]) -> Self {
        self.input = to_locators(locators);
        self
    }

    pub fn with_submit(mut self, locators: &[&str]) -> Self {
        self.submit = to_locators(locators);
        self
    }

    pub fn with_response_container(mut self, locators: &[&str]) -> Self {
        self.response_container = to_locators(locators);
        self
    }

    pub fn with_response_text(mut self, locators: &[&str]) -> Self {
        self.response_text = to_locators(locators);
        self
    }

    pub fn with_in_progress(mut self, locators: &[&str]) -> Self {
        self.in_progress = to_locators(locators);
        self
    }

    pub fn with_login_required(mut self, locators: &[&str]) -> Self {
        self.login_required = to_locators(locators);
        self
    }

    pub fn with_completion(mut self, completion: CompletionDetection) -> Self {
        self.completion = completion;
        self
    }
}

fn to_locators(locators: &[&str]) -> Vec<Locator> {
    locators.iter().map(|l| Locator::new(*l)).collect()
}

/// 内置的四个聊天机器人；选择器列表按「最具体 → 最宽泛」排列
pub fn builtin_descriptors() -> Vec<AgentDescriptor> {
    vec![
        AgentDescriptor::new("chatgpt", "ChatGPT", "https://chat.openai.com")
            .with_input(&["#prompt-textarea", "textarea[data-id='root']", "div[contenteditable='true']"])
            .with_submit(&["button[data-testid='send-button']", "button[aria-label='Send prompt']"])
            .with_response_container(&["div[data-message-author-role='assistant']", "article"])
            .with_response_text(&["div[data-message-author-role='assistant'] .markdown"])
            .with_in_progress(&["button[data-testid='stop-button']", "button[aria-label='Stop generating']"])
            .with_login_required(&["button[data-testid='login-button']"]),
        AgentDescriptor::new("claude", "Claude", "https://claude.ai")
            .with_input(&["div[contenteditable='true'].ProseMirror", "div[contenteditable='true']"])
            .with_submit(&["button[aria-label='Send message']", "button[aria-label='Send Message']"])
            .with_response_container(&["div[data-is-streaming]", "div.font-claude-message"])
            .with_response_text(&["div.font-claude-message p", "div.font-claude-message"])
            .with_in_progress(&["div[data-is-streaming='true']", "button[aria-label='Stop response']"])
            .with_login_required(&["a[href='/login']"]),
        AgentDescriptor::new("gemini", "Gemini", "https://gemini.google.com")
            .with_input(&["rich-textarea div.ql-editor", "div[contenteditable='true']"])
            .with_submit(&["button.send-button", "button[aria-label='Send message']"])
            .with_response_container(&["model-response", "message-content"])
            .with_response_text(&["model-response message-content .markdown", "message-content"])
            .with_in_progress(&["button[aria-label='Stop response']", ".loading-indicator"])
            .with_login_required(&["a[href*='accounts.google.com/ServiceLogin']"]),
        AgentDescriptor::new("perplexity", "Perplexity", "https://www.perplexity.ai")
            .with_input(&["textarea[placeholder*='Ask']", "textarea"])
            .with_submit(&["button[aria-label='Submit']", "button[type='submit']"])
            .with_response_container(&["div.prose", "main"])
            .with_response_text(&["div.prose p", "div.prose"])
            .with_in_progress(&["button[aria-label='Stop']"])
            // 无停止按钮的短回复较常见，改用文本稳定判定
            .with_completion(CompletionDetection::TextStable { stable_polls: 2 }),
    ]
}
