//! Critic：完成度评审
//!
//! 评审角色只拿到状态视图（不检索、不推进条目年龄），能力集合为空，从不修改计划或调用工具。
//! 结论判定：输出中任意位置出现 `<yes>`（不区分大小写）即为通过，否则视为未通过。

use crate::core::{Phase, Session};
use crate::react::{OrchestratorEvent, TurnEngine, TurnSpec};
use crate::roles::Role;

const ASSESS_INSTRUCTION: &str = "**Assess Completion:** Review the original request of the User, the \
history and especially the results of the last action.\n\
Is all the information needed for a complete and final answer available now? Explain your reasoning.\n\n\
* **If YES:** check every part of the request against the gathered results. Were there extraction \
failures, and were they resolved? If code was needed, was the `<code>` command actually used and does \
its output answer that part? Only when you are certain, justify why the task is complete and end your \
output *only* with the tag `<Yes>`.\n\
* **If NO:** explain what is missing, why the last results were insufficient and which command should \
come next. End your output *only* with the tag `<No>`.";

const PLAN_REVIEW_INSTRUCTION: &str = "**Your Task:** Review the plan that was just generated for the \
request of the User. The plan is shown in the context.\n\n\
**Criteria:** completeness, logical order of the steps, feasibility with the available commands, and \
steps that are specific enough to act on.\n\n\
* **If YES:** explain briefly why it meets the criteria and end your output *only* with the tag `<Yes>`.\n\
* **If NO:** name the weaknesses and concrete improvements, and end your output *only* with the tag `<No>`.";

/// 输出中是否包含通过标记
pub fn is_positive(text: &str) -> bool {
    text.to_lowercase().contains("<yes>")
}

/// 评审结论
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub positive: bool,
    pub text: String,
}

/// 评审可针对整体完成度、新计划或当前步骤
#[derive(Debug, Clone, Copy)]
pub enum Review<'a> {
    Completion,
    Plan,
    Step(&'a str),
}

impl Review<'_> {
    fn phase(&self) -> Phase {
        match self {
            Review::Plan => Phase::Planning,
            _ => Phase::Assessing,
        }
    }

    fn instruction(&self) -> String {
        match self {
            Review::Completion => ASSESS_INSTRUCTION.to_string(),
            Review::Plan => PLAN_REVIEW_INSTRUCTION.to_string(),
            Review::Step(step) => format!(
                "**Your Task:** Assess whether the current plan step has been completed.\n\n\
                 **Step:**\n---\n{step}\n---\n\n\
                 Based on the results in the history, is the objective of *this specific step* fully achieved?\n\
                 * **If YES:** explain briefly how the results satisfy it and end your output *only* with the tag `<Yes>`.\n\
                 * **If NO:** explain what is still missing for this step and end your output *only* with the tag `<No>`."
            ),
        }
    }
}

pub async fn review(engine: &TurnEngine<'_>, session: &mut Session, critic: &Role, kind: Review<'_>) -> Verdict {
    let instruction = kind.instruction();
    let turn = engine
        .take_turn(
            session,
            critic,
            TurnSpec {
                phase: kind.phase(),
                instruction: &instruction,
                status_only: true,
            },
        )
        .await;
    // 调用失败的替换文本不会含通过标记
    let positive = is_positive(&turn.text);
    tracing::info!(session = %session.id(), critic = %critic.name, positive, "verdict");
    engine.emit(OrchestratorEvent::Verdict {
        session_id: session.id().to_string(),
        positive,
    });
    Verdict {
        positive,
        text: turn.text,
    }
}
