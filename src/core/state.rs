//! Agent 状态机
//!
//! Uninitialized → Initializing → Ready → Submitting → AwaitingCompletion → Extracting
//! → {Succeeded | Failed} → Closed。
//! 重试时从 Submitting / AwaitingCompletion / Extracting 回到 Submitting；
//! 任意非终止状态都可进入 Failed；Closed 从任何状态都可达（保证资源释放）。

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Uninitialized,
    Initializing,
    Ready,
    Submitting,
    AwaitingCompletion,
    Extracting,
    Succeeded,
    Failed,
    Closed,
}

impl AgentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentPhase::Succeeded | AgentPhase::Failed | AgentPhase::Closed
        )
    }

    /// 是否已越过初始化阶段（持有或曾持有会话）
    pub fn has_started(self) -> bool {
        !matches!(self, AgentPhase::Uninitialized)
    }

    pub fn can_transition_to(self, next: AgentPhase) -> bool {
        use AgentPhase::*;
        match (self, next) {
            (_, Closed) => true,
            (Closed, _) => false,
            (Succeeded | Failed, _) => false,
            (_, Failed) => true,
            (Uninitialized, Initializing) => true,
            (Initializing, Ready) => true,
            (Ready, Submitting) => true,
            (Submitting, AwaitingCompletion) => true,
            (AwaitingCompletion, Extracting) => true,
            (Extracting, Succeeded) => true,
            // 重试：回到提交步骤，不重新导航
            (Submitting | AwaitingCompletion | Extracting, Submitting) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentPhase::Uninitialized => "uninitialized",
            AgentPhase::Initializing => "initializing",
            AgentPhase::Ready => "ready",
            AgentPhase::Submitting => "submitting",
            AgentPhase::AwaitingCompletion => "awaiting_completion",
            AgentPhase::Extracting => "extracting",
            AgentPhase::Succeeded => "succeeded",
            AgentPhase::Failed => "failed",
            AgentPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::AgentPhase::*;
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Uninitialized,
            Initializing,
            Ready,
            Submitting,
            AwaitingCompletion,
            Extracting,
            Succeeded,
            Closed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_closed_reachable_from_everywhere() {
        for phase in [
            Uninitialized,
            Initializing,
            Ready,
            Submitting,
            AwaitingCompletion,
            Extracting,
            Succeeded,
            Failed,
            Closed,
        ] {
            assert!(phase.can_transition_to(Closed));
        }
    }

    #[test]
    fn test_retry_returns_to_submitting() {
        assert!(AwaitingCompletion.can_transition_to(Submitting));
        assert!(Extracting.can_transition_to(Submitting));
        assert!(!Ready.can_transition_to(Extracting));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Ready));
        assert!(!Closed.can_transition_to(Ready));
        assert!(Succeeded.is_terminal() && Failed.is_terminal() && Closed.is_terminal());
    }

    #[test]
    fn test_cannot_submit_before_ready() {
        assert!(!Uninitialized.can_transition_to(Submitting));
        assert!(!Initializing.can_transition_to(Submitting));
    }
}
