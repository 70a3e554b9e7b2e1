//! 角色层：能力集合、角色阵容、命令说明

pub mod capability;
pub mod instructions;
pub mod persona;

pub use capability::{Capability, CapabilitySet};
pub use instructions::instructions_for;
pub use persona::{
    default_actor, default_critic, default_planner, default_responder, Role, RoleKind, RoleRoster,
};
