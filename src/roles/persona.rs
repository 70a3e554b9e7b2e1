//! 角色定义：名称、人设、模型、检索集合，以及按阶段区分的能力集合
//!
//! 默认阵容：Planning Agent（规划）、Tinker Agent（执行）、Critic（评审）、Summarizing Agent（回复）。
//! 阶段能力在构建时确定，运行中不再修改；每轮按值取出使用。

use std::collections::HashMap;

use crate::core::Phase;
use crate::roles::{Capability, CapabilitySet};

/// 角色在编排中承担的职责
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Planner,
    Actor,
    Critic,
    Responder,
}

#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub persona: String,
    /// 未设置时使用编排器默认模型
    pub model_id: Option<String>,
    /// 文档检索使用的集合
    pub collection: Option<String>,
    phase_capabilities: HashMap<Phase, CapabilitySet>,
}

impl Role {
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
            model_id: None,
            collection: None,
            phase_capabilities: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_capabilities(mut self, phase: Phase, caps: CapabilitySet) -> Self {
        self.phase_capabilities.insert(phase, caps);
        self
    }

    /// 该角色在指定阶段可用的命令；未配置的阶段为空集合
    pub fn capabilities(&self, phase: Phase) -> CapabilitySet {
        self.phase_capabilities
            .get(&phase)
            .copied()
            .unwrap_or_default()
    }
}

/// 编排使用的角色阵容
#[derive(Debug, Clone)]
pub struct RoleRoster {
    pub planner: Option<Role>,
    pub actor: Role,
    pub critic: Option<Role>,
    pub responder: Role,
}

impl Default for RoleRoster {
    fn default() -> Self {
        Self {
            planner: Some(default_planner()),
            actor: default_actor(),
            critic: Some(default_critic()),
            responder: default_responder(),
        }
    }
}

pub fn default_planner() -> Role {
    let planning: CapabilitySet = [
        Capability::ShortMemory,
        Capability::LongMemory,
        Capability::Query,
        Capability::Document,
        Capability::Plan,
    ]
    .into_iter()
    .collect();
    Role::new(
        "Planning Agent",
        "You are a planning agent. You are given tasks by the User and break them down into a \
         plan with a flexible number of concrete steps.\nYour handle in the chat is `Planning Agent`.\n\
         The User can only see the content of `<response>` sections.",
    )
    .with_collection("python")
    .with_capabilities(Phase::Planning, planning)
}

pub fn default_actor() -> Role {
    // 执行阶段不能回复，回复留给独立的收尾阶段
    let acting = CapabilitySet::all().without(Capability::Response);
    Role::new(
        "Tinker Agent",
        "You are the Tinker Agent. You are given tasks by the User and must complete them.\n\
         Use all the tools at your disposal to solve the request; you are exceptionally adept at \
         writing code.\nYou can not directly interact with the User.\n\
         You are done when you have completed the task.\nYour handle in the chat is `Tinker Agent`.",
    )
    .with_collection("python")
    .with_capabilities(Phase::Acting, acting)
}

pub fn default_critic() -> Role {
    Role::new(
        "Critic",
        "You are a Critic. Another agent is given tasks by the User and you evaluate its work for \
         completeness.\nYour handle in the chat is `Critic`.\n\
         Finish your evaluation with either <Yes> or <No>, depending on the performance of the other agent.",
    )
    .with_capabilities(Phase::Assessing, CapabilitySet::empty())
    .with_capabilities(Phase::Planning, CapabilitySet::empty())
}

pub fn default_responder() -> Role {
    let responding: CapabilitySet = [
        Capability::ShortMemory,
        Capability::LongMemory,
        Capability::Response,
    ]
    .into_iter()
    .collect();
    Role::new(
        "Summarizing Agent",
        "You are the Summarizing Agent. Other agents worked on the User's request; you explain to \
         the User what has been done and what the result is.\n\
         Your handle in the chat is `Summarizing Agent`.",
    )
    .with_capabilities(Phase::Responding, responding)
}
