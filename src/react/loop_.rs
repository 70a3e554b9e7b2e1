//! 执行与回复循环
//!
//! - 无计划：执行角色 → 评审角色，直到评审通过或达到全局迭代上限
//! - 有计划：按游标逐步执行；步骤由 `<next_step/>` 或工具调用后的评审通过完成；
//!   同一步骤（游标位置 + 步骤文本）反复超过 max_step_iterations 次时强制前进并警告
//! - 回复：回复角色最多尝试 max_responding_iterations 次，直到一条独立的 `<response>` 写入用户记录
//!
//! 达到全局上限时恰好写入一次警告（所有聊天记录），随后进入回复阶段。

use crate::config::OrchestratorSection;
use crate::core::{AgentError, Phase, RecoveryAction, Session};
use crate::react::critic::{review, Review};
use crate::react::{TurnEngine, TurnSpec};
use crate::roles::RoleRoster;

const ACTING_INSTRUCTION: &str = "**Instructions:**\n\
1. **Understand:** read the request of the User, the history and the current context carefully.\n\
2. **Plan:** explain step by step which commands (`<code>`, `<query>`, `<document>`, ...) are required now.\n\
3. **Execute:** output the command for the *single most important* next step. If you need clarification, \
do not output a command and explain why you are blocked.\n\
4. **Memory:** consider whether `<long_memory>` is appropriate for any findings.";

const RESPOND_INSTRUCTION: &str = "The working phase is complete. You **must** now give the final, \
comprehensive answer to the User inside `<response><![CDATA[...]]></response>`.\n\n\
Review the original request and the full history with all results. The response must reference the \
request, state the answer or outcome, briefly summarize the steps taken and interpret any relevant \
code output. The User only saw their own messages, earlier responses and code output.\n\n\
You may also use `<long_memory>` if appropriate.";

const RESPOND_AFTER_PLAN_INSTRUCTION: &str = "**Your Task:** All planned steps have been executed. Give \
the complete and final answer to the User inside `<response><![CDATA[...]]></response>`.\n\n\
Examine the original request, the executed plan in the context and all results in the history. The \
response must answer the original request directly, state the final outcome, summarize the key steps \
of the plan and interpret crucial results. It must be understandable on its own.\n\n\
You may also use `<long_memory>` if appropriate.";

/// 回复阶段始终未能得到回复时写入用户记录的警告
pub const NO_RESPONSE_WARNING: &str =
    "No final response could be produced for this request. Please try again or rephrase it.";

fn step_instruction(step: &str, index: usize, total: usize) -> String {
    format!(
        "You are executing the plan step by step ({}/{total}).\n\n\
         **Your Task:** Execute the current step.\n\n**Current Step:**\n---\n{step}\n---\n\n\
         Focus *only* on the actions of this step and use the commands (`<code>`, `<query>`, `<document>`) \
         it needs. When the step is done and you are not waiting for command results, signal it with `<next_step/>`.",
        index + 1
    )
}

/// 达到全局上限时写入一次警告并返回 true
fn ceiling_reached(engine: &TurnEngine<'_>, session: &mut Session, cfg: &OrchestratorSection) -> bool {
    if session.iterations() < cfg.max_iterations {
        return false;
    }
    let err = AgentError::CeilingExceeded(format!("{} iterations", session.iterations()));
    if let RecoveryAction::ForceRespond(text) = engine.recovery.handle(&err) {
        engine.warn_all(session, &text);
    }
    true
}

/// 无计划的执行/评审循环
pub async fn act_unplanned(
    engine: &TurnEngine<'_>,
    session: &mut Session,
    roster: &RoleRoster,
    cfg: &OrchestratorSection,
) {
    loop {
        if ceiling_reached(engine, session, cfg) {
            return;
        }
        let turn = engine
            .take_turn(
                session,
                &roster.actor,
                TurnSpec {
                    phase: Phase::Acting,
                    instruction: ACTING_INSTRUCTION,
                    status_only: false,
                },
            )
            .await;
        session.bump_iterations();
        if turn.report.extraction_failed {
            continue;
        }
        match roster.critic.as_ref() {
            Some(critic) => {
                if review(engine, session, critic, Review::Completion).await.positive {
                    return;
                }
            }
            // 没有评审角色时，执行角色不再等待工具结果即视为完成
            None => {
                if !turn.report.tool_used {
                    return;
                }
            }
        }
    }
}

/// 按计划逐步执行
pub async fn act_planned(
    engine: &TurnEngine<'_>,
    session: &mut Session,
    roster: &RoleRoster,
    cfg: &OrchestratorSection,
) {
    let mut current: Option<(usize, String)> = None;
    let mut attempts = 0usize;

    while let Some(step) = session.plan().current_step().map(str::to_owned) {
        if ceiling_reached(engine, session, cfg) {
            return;
        }
        let index = session.plan().current_index();
        let total = session.plan().len();
        let key = (index, step.clone());
        if current.as_ref() == Some(&key) {
            attempts += 1;
        } else {
            current = Some(key);
            attempts = 1;
            session.logs_mut().append_all(
                crate::memory::SYSTEM_SENDER,
                &format!("Working on step: {step} ({}/{total})", index + 1),
            );
        }
        if attempts > cfg.max_step_iterations {
            engine.warn_all(
                session,
                &format!(
                    "Step {} did not complete after {} attempts. Moving on to the next step.",
                    index + 1,
                    cfg.max_step_iterations
                ),
            );
            session.next_step();
            continue;
        }

        let instruction = step_instruction(&step, index, total);
        let turn = engine
            .take_turn(
                session,
                &roster.actor,
                TurnSpec {
                    phase: Phase::Acting,
                    instruction: &instruction,
                    status_only: false,
                },
            )
            .await;
        session.bump_iterations();

        let report = &turn.report;
        if report.extraction_failed || report.advanced || report.plan_set || !report.tool_used {
            continue;
        }
        if let Some(critic) = roster.critic.as_ref() {
            if review(engine, session, critic, Review::Step(&step)).await.positive {
                session.next_step();
            }
        }
    }
}

/// 回复阶段；返回写入用户记录的文本
pub async fn respond(
    engine: &TurnEngine<'_>,
    session: &mut Session,
    roster: &RoleRoster,
    cfg: &OrchestratorSection,
) -> String {
    let instruction = if session.plan().is_set() {
        RESPOND_AFTER_PLAN_INSTRUCTION
    } else {
        RESPOND_INSTRUCTION
    };
    for attempt in 1..=cfg.max_responding_iterations {
        let turn = engine
            .take_turn(
                session,
                &roster.responder,
                TurnSpec {
                    phase: Phase::Responding,
                    instruction,
                    status_only: true,
                },
            )
            .await;
        if turn.report.responded {
            if let Some(last) = session.logs().user.last() {
                return last.text.clone();
            }
        }
        tracing::info!(session = %session.id(), attempt, rejected = turn.report.rejected, "no response yet");
    }
    engine.warn_all(session, NO_RESPONSE_WARNING);
    NO_RESPONSE_WARNING.to_string()
}
