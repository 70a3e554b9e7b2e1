//! 核心编排层：错误与恢复、阶段与快照、会话、构建器、主控状态机

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session;
pub mod state;

pub use builder::{create_orchestrator_builder, OrchestratorBuilder};
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{create_model_from_config, Orchestrator};
pub use recovery::{RecoveryEngine, CEILING_WARNING, INVOCATION_FAILURE_TEXT};
pub use session::Session;
pub use state::Phase;
