//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供编排循环决定是注入诊断、重试本轮、替换文本还是强制回复。

use crate::core::{AgentError, RecoveryAction};

/// 模型调用失败时替换输出的固定文本
pub const INVOCATION_FAILURE_TEXT: &str =
    "Error when attempting to prompt the LLM. Please try again.";

/// 达到全局迭代上限时写入所有聊天记录的警告
pub const CEILING_WARNING: &str =
    "Maximum iterations reached. Summarizing, current state of completeness.";

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Extraction { fragment, reason } => RecoveryAction::InjectDiagnostic(
                format!("Error parsing command: {reason}\nFragment:\n{fragment}"),
            ),
            AgentError::CommandConflict(msg) => RecoveryAction::RetryTurn(msg.clone()),
            AgentError::ToolExecution(msg) => RecoveryAction::InjectDiagnostic(msg.clone()),
            AgentError::ToolTimeout(tool) => RecoveryAction::InjectDiagnostic(format!(
                "Command {tool} timed out before producing a result."
            )),
            AgentError::PathEscape(path) => RecoveryAction::InjectDiagnostic(format!(
                "Access denied: {path} is outside the workspace."
            )),
            AgentError::Invocation(_) => {
                RecoveryAction::SubstituteText(INVOCATION_FAILURE_TEXT.to_string())
            }
            AgentError::CeilingExceeded(_) => {
                RecoveryAction::ForceRespond(CEILING_WARNING.to_string())
            }
            AgentError::Config(msg) => {
                RecoveryAction::InjectDiagnostic(format!("Configuration problem: {msg}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_extraction_keeps_fragment() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Extraction {
            fragment: "<code>".to_string(),
            reason: "unclosed tag".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::InjectDiagnostic(msg) => {
                assert!(msg.contains("unclosed tag"));
                assert!(msg.contains("<code>"));
            }
            other => panic!("Expected InjectDiagnostic, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_invocation_substitutes_apology() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::Invocation("rate limited".into()));
        assert_eq!(
            action,
            RecoveryAction::SubstituteText(INVOCATION_FAILURE_TEXT.to_string())
        );
    }

    #[test]
    fn test_recovery_conflict_retries() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::CommandConflict("response with code".into()));
        assert_eq!(action, RecoveryAction::RetryTurn("response with code".into()));
    }

    #[test]
    fn test_recovery_ceiling_forces_response() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::CeilingExceeded("acting".into()));
        assert_eq!(action, RecoveryAction::ForceRespond(CEILING_WARNING.to_string()));
    }

    #[test]
    fn test_recovery_tool_timeout() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::ToolTimeout("code".into()));
        assert!(matches!(action, RecoveryAction::InjectDiagnostic(m) if m.contains("code")));
    }
}
