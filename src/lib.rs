//! Hive - 多聊天机器人提示词分发器
//!
//! 把同一个提示词并发发给多个网页聊天机器人（ChatGPT / Claude / Gemini / Perplexity …），
//! 在各自隔离的浏览器会话里提交、等待生成完成、提取回复，汇总成一个结果。
//!
//! 模块划分：
//! - **agent**: Agent 描述、注册表与通用 Agent 运行时（状态机 + 一次问答交互）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、重试、元素定位、状态、请求与结果、编排器
//! - **driver**: 页面驱动抽象与实现（Mock / Headless Chrome）
//! - **observability**: tracing 初始化与有界运行日志
//! - **session**: 会话持久化（内存 / 文件）

pub mod agent;
pub mod config;
pub mod core;
pub mod driver;
pub mod observability;
pub mod session;

pub use crate::core::{AggregateResult, HiveError, Orchestrator, PromptRequest};
