//! 编排过程事件：用于向前端或日志推送阶段切换、角色输出、命令结果与回复

use serde::Serialize;

use crate::core::Phase;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// 进入新阶段
    PhaseChange { session_id: String, phase: Phase },
    /// 某角色完成一轮输出（预览，避免过长）
    Turn {
        session_id: String,
        role: String,
        phase: Phase,
        iteration: usize,
        preview: String,
    },
    /// 单条命令的执行结果
    CommandResult {
        session_id: String,
        tag: String,
        applied: bool,
        result: String,
    },
    /// 评审结论
    Verdict {
        session_id: String,
        positive: bool,
    },
    /// 降级警告（迭代上限、步骤卡住、模型调用失败等）
    Warning { session_id: String, text: String },
    /// 写入用户可见记录的最终回复
    Response { session_id: String, role: String, text: String },
}
