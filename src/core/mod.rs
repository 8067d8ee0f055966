//! 核心层：错误分类、重试、元素定位、Agent 状态机、请求与结果、编排器

pub mod classifier;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod resolver;
pub mod retry;
pub mod state;

pub use classifier::ErrorClassifier;
pub use error::{AgentError, ErrorKind, HiveError};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use outcome::{AgentOutcome, AggregateResult, OutcomeStatus, SessionSetupOutcome};
pub use request::{parse_agent_ids, PromptRequest, RequestOverrides};
pub use resolver::ElementResolver;
pub use retry::{Retried, RetryError, RetryExecutor, RetryPolicy};
pub use state::AgentPhase;
