//! 编排错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 InjectDiagnostic / RetryTurn / SubstituteText / ForceRespond。
//! 任何错误都不会中止会话，最终都会落为聊天记录中的一条可见文本。

use thiserror::Error;

/// 编排过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 模型输出中的片段无法解析为命令
    #[error("Extraction failed: {reason}")]
    Extraction { fragment: String, reason: String },

    /// 同一批命令中出现互斥组合（如 response + code）
    #[error("Command conflict: {0}")]
    CommandConflict(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 模型调用失败
    #[error("Invocation error: {0}")]
    Invocation(String),

    /// 迭代次数达到上限
    #[error("Ceiling exceeded: {0}")]
    CeilingExceeded(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 作为诊断文本注入上下文与聊天记录，会话继续
    InjectDiagnostic(String),
    /// 拒绝本轮输出，由同一角色重试
    RetryTurn(String),
    /// 用固定文本替换模型输出，并计入迭代次数
    SubstituteText(String),
    /// 强制进入回复阶段，并向所有聊天记录追加警告
    ForceRespond(String),
}
