//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__RETRY__MAX_ATTEMPTS=5`）。
//! 所有字段都有默认值，缺省整段也能运行。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::Timeouts;
use crate::core::{OrchestratorSettings, RetryPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub browser: BrowserSection,
    pub timeouts: TimeoutsSection,
    pub retry: RetrySection,
    /// [agents.<id>] 覆盖内置描述
    pub agents: HashMap<String, AgentOverride>,
}

/// [app] 段：会话目录、运行日志容量、是否在成功后刷新会话
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub session_dir: PathBuf,
    pub log_capacity: usize,
    pub persist_sessions: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("sessions"),
            log_capacity: 1000,
            persist_sessions: true,
        }
    }
}

/// [browser] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1280,
            window_height: 900,
        }
    }
}

/// [timeouts] 段（毫秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    pub navigation: u64,
    pub ready: u64,
    pub element: u64,
    pub response: u64,
    pub poll_interval: u64,
    pub settle: u64,
    pub extract: u64,
    pub login: u64,
    pub close: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            navigation: 30_000,
            ready: 15_000,
            element: 10_000,
            response: 120_000,
            poll_interval: 1_000,
            settle: 1_500,
            extract: 5_000,
            login: 300_000,
            close: 5_000,
        }
    }
}

impl TimeoutsSection {
    pub fn to_timeouts(&self) -> Timeouts {
        Timeouts {
            navigation: Duration::from_millis(self.navigation),
            ready: Duration::from_millis(self.ready),
            element: Duration::from_millis(self.element),
            response: Duration::from_millis(self.response),
            poll_interval: Duration::from_millis(self.poll_interval),
            settle: Duration::from_millis(self.settle),
            extract: Duration::from_millis(self.extract),
            login: Duration::from_millis(self.login),
            close: Duration::from_millis(self.close),
        }
    }
}

/// [retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_factor,
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// [agents.<id>] 段：只允许覆盖启用状态与入口地址
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct AgentOverride {
    pub enabled: Option<bool>,
    pub url: Option<String>,
}

impl AppConfig {
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            timeouts: self.timeouts.to_timeouts(),
            retry: self.retry.to_policy(),
            persist_sessions: self.app.persist_sessions,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记警告并退回默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
