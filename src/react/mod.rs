//! 编排循环：单轮调用、评审、规划、执行与回复

pub mod critic;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod turn;

pub use critic::{is_positive, Review, Verdict};
pub use events::OrchestratorEvent;
pub use loop_::{act_planned, act_unplanned, respond, NO_RESPONSE_WARNING};
pub use planner::plan_request;
pub use turn::{build_prompt, TurnEngine, TurnResult, TurnSpec, USER_PROMPT_HEADER};
