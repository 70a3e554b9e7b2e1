//! 规划阶段
//!
//! 规划角色输出 `<plan>`，最多尝试 max_planning_iterations 次；开启复核时由评审角色判定计划是否可用，
//! 未通过则重新规划。尝试用尽时沿用最后一份计划；从未得到计划则返回 false，由调用方退回无计划模式。

use crate::config::OrchestratorSection;
use crate::core::{Phase, Session};
use crate::react::critic::{review, Review};
use crate::react::{TurnEngine, TurnSpec};
use crate::roles::RoleRoster;

const PLANNING_INSTRUCTION: &str = "# **Instructions**\n\
Create a detailed, step-by-step plan for the request of the User using the `<plan>` structure.\n\n\
Break the problem down logically:\n\
1. **Understand:** what is the core objective, and what are the expected inputs and outputs?\n\
2. **Information:** which documents (`<document>`), stored knowledge (`<query>`) or data exploration \
(`<code>`) is needed?\n\
3. **Method:** outline the analysis or coding steps; split complex work into smaller steps.\n\
4. **Validation:** how will results be checked?\n\
5. **Synthesis:** finish with a step that consolidates the findings for the final response.\n\n\
Be specific in each step and think about which commands each step will need.";

const ANNOUNCE_INSTRUCTION: &str = "**Your Task:** Summarize the approved plan for the User. The plan is \
shown in the context.\n\n\
Explain its main steps clearly and concisely inside `<response><![CDATA[...]]></response>`. Focus on \
the overall approach and what the User can expect.";

/// 为当前请求建立计划；返回是否得到可执行的计划
pub async fn plan_request(
    engine: &TurnEngine<'_>,
    session: &mut Session,
    roster: &RoleRoster,
    cfg: &OrchestratorSection,
) -> bool {
    let Some(planner) = roster.planner.as_ref() else {
        return false;
    };

    for attempt in 1..=cfg.max_planning_iterations {
        tracing::info!(session = %session.id(), attempt, "developing plan");
        let turn = engine
            .take_turn(
                session,
                planner,
                TurnSpec {
                    phase: Phase::Planning,
                    instruction: PLANNING_INSTRUCTION,
                    status_only: false,
                },
            )
            .await;
        if turn.report.extraction_failed || !turn.report.plan_set {
            continue;
        }
        let approved = match roster.critic.as_ref() {
            Some(critic) if cfg.plan_review => review(engine, session, critic, Review::Plan).await.positive,
            _ => true,
        };
        if approved {
            break;
        }
    }

    if !session.plan().is_set() {
        engine.warn_all(
            session,
            "No plan could be created. Continuing without a plan.",
        );
        return false;
    }

    if cfg.announce_plan {
        let announcement = engine
            .take_turn(
                session,
                &roster.responder,
                TurnSpec {
                    phase: Phase::Responding,
                    instruction: ANNOUNCE_INSTRUCTION,
                    status_only: true,
                },
            )
            .await;
        if !announcement.report.responded {
            tracing::warn!(session = %session.id(), "plan announcement produced no response");
        }
    }
    true
}
