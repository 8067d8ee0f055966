//! Hive 命令行入口
//!
//! - `hive agents`：列出内置 Agent（JSON）
//! - `hive setup-sessions [--agents a,b]`：打开浏览器等待手动登录，保存会话
//! - `hive prompt --agents a,b <PROMPT>`：并发分发并输出汇总结果（JSON）
//!
//! 日志写 stderr，stdout 只输出 JSON。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hive::{
    agent::AgentRegistry,
    config::{load_config_or_default, AppConfig},
    core::{parse_agent_ids, Orchestrator, PromptRequest},
    driver::BrowserEngine,
    observability::{self, LogBuffer},
    session::FileSessionStore,
};

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// List configured agents
    Agents,
    /// Open each agent, wait for manual login and save the session
    SetupSessions {
        /// Comma-separated agent ids (default: all enabled)
        #[arg(long)]
        agents: Option<String>,
    },
    /// Send one prompt to several agents and print the aggregate result
    Prompt {
        /// Comma-separated agent ids
        #[arg(long)]
        agents: String,
        /// Response wait budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Retries per agent (attempts = retries + 1)
        #[arg(long)]
        max_retries: Option<u32>,
        /// Print the run log to stderr after the result
        #[arg(long)]
        dump_log: bool,
        /// Prompt text
        prompt: String,
    },
}

#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(version)]
#[command(about = "Dispatch one prompt to several web chatbots in parallel", long_about = None)]
struct Args {
    /// Configuration file path (overrides config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = Args::parse();
    let cfg = load_config_or_default(args.config.clone());
    let registry = AgentRegistry::builtin().with_overrides(&cfg.agents);

    match args.command {
        Command::Agents => {
            let json = serde_json::to_string_pretty(&registry.all())
                .context("Failed to serialize agents")?;
            println!("{json}");
        }
        Command::SetupSessions { agents } => {
            let ids = agents.as_deref().map(parse_agent_ids).unwrap_or_default();
            // 登录需要可见窗口
            let mut cfg = cfg;
            cfg.browser.headless = false;
            let orchestrator = build_orchestrator(&cfg, registry).await?;
            let results = orchestrator
                .setup_sessions(&ids)
                .await
                .context("Session setup failed")?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Prompt {
            agents,
            timeout_ms,
            max_retries,
            dump_log,
            prompt,
        } => {
            let mut request = PromptRequest::new(prompt, parse_agent_ids(&agents));
            request.overrides.timeout_ms = timeout_ms;
            request.overrides.max_retries = max_retries;

            let orchestrator = build_orchestrator(&cfg, registry).await?;
            let outcome = orchestrator.run_prompt(request).await;
            if dump_log {
                for entry in orchestrator.log().all() {
                    eprintln!("{}", serde_json::to_string(&entry)?);
                }
            }
            let result = outcome.context("Prompt dispatch failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

async fn build_orchestrator(cfg: &AppConfig, registry: AgentRegistry) -> anyhow::Result<Orchestrator> {
    let engine = launch_engine(cfg).await?;
    let sessions = Arc::new(FileSessionStore::new(cfg.app.session_dir.clone()));
    let log = Arc::new(LogBuffer::new(cfg.app.log_capacity));
    Ok(Orchestrator::new(
        registry,
        engine,
        sessions,
        cfg.orchestrator_settings(),
        log,
    ))
}

#[cfg(feature = "browser")]
async fn launch_engine(cfg: &AppConfig) -> anyhow::Result<Arc<dyn BrowserEngine>> {
    use hive::driver::{ChromeEngine, ChromeOptions};

    let options = ChromeOptions {
        headless: cfg.browser.headless,
        chrome_path: cfg.browser.chrome_path.clone(),
        window_width: cfg.browser.window_width,
        window_height: cfg.browser.window_height,
    };
    let engine = ChromeEngine::launch(options)
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to start browser")?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "browser"))]
async fn launch_engine(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn BrowserEngine>> {
    anyhow::bail!("hive was built without a browser engine; rebuild with `--features browser`")
}
