//! 编排阶段
//!
//! Phase 描述状态机当前所处阶段，随事件流一起序列化给外部。

use serde::Serialize;

/// 编排阶段：Idle → [Planning] → Acting → [Assessing] → Responding → Idle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Planning,
    Acting,
    Assessing,
    Responding,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Planning => "planning",
            Phase::Acting => "acting",
            Phase::Assessing => "assessing",
            Phase::Responding => "responding",
        }
    }
}
