//! 单轮角色调用
//!
//! 一轮 = 装配上下文 → 拼提示词 → 调用模型（失败则替换为固定文本）→ 写入思考记录 → 提取并分派命令。
//! 提示词格式：`用户请求\n\n---\n\n阶段指令\n\n---\n\n命令说明\n\n---\n\n上下文`，空段省略。
//! 用户请求单独成段，不受聊天记录预算截断。

use tokio::sync::mpsc::UnboundedSender;

use crate::command::{extract, CommandDispatcher, DispatchReport, TurnContext};
use crate::core::{AgentError, Phase, RecoveryAction, RecoveryEngine, Session};
use crate::llm::ModelClient;
use crate::memory::{AssemblyRequest, ContextAssembler, SYSTEM_SENDER};
use crate::react::OrchestratorEvent;
use crate::roles::{instructions_for, CapabilitySet, Role};

/// 提示词首段：用户请求
pub const USER_PROMPT_HEADER: &str = "# **User Prompt**:";

/// 事件中角色输出的预览长度
const PREVIEW_CHARS: usize = 300;

/// 本轮要求
#[derive(Debug, Clone, Copy)]
pub struct TurnSpec<'a> {
    pub phase: Phase,
    pub instruction: &'a str,
    /// 只读状态视图：跳过检索，不推进条目年龄
    pub status_only: bool,
}

/// 一轮的结果
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub text: String,
    pub report: DispatchReport,
    pub invocation_failed: bool,
}

/// 编排器借出的一组只读协作者，供各阶段循环复用
pub struct TurnEngine<'a> {
    pub model: &'a dyn ModelClient,
    pub assembler: &'a ContextAssembler,
    pub dispatcher: &'a CommandDispatcher,
    pub recovery: &'a RecoveryEngine,
    pub events: Option<&'a UnboundedSender<OrchestratorEvent>>,
    pub default_model: &'a str,
    /// 可用文档路径，渲染进 document 命令说明
    pub documents: &'a [String],
}

impl TurnEngine<'_> {
    pub fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// 写入全部聊天记录的系统警告
    pub fn warn_all(&self, session: &mut Session, text: &str) {
        tracing::warn!(session = %session.id(), "{}", text);
        session.logs_mut().append_all(SYSTEM_SENDER, text);
        self.emit(OrchestratorEvent::Warning {
            session_id: session.id().to_string(),
            text: text.to_string(),
        });
    }

    pub fn enter(&self, session: &mut Session, phase: Phase) {
        if session.phase() != phase {
            session.set_phase(phase);
            self.emit(OrchestratorEvent::PhaseChange {
                session_id: session.id().to_string(),
                phase,
            });
        }
    }

    pub async fn take_turn(&self, session: &mut Session, role: &Role, spec: TurnSpec<'_>) -> TurnResult {
        let caps = role.capabilities(spec.phase);
        let model_id = role.model_id.as_deref().unwrap_or(self.default_model);
        self.enter(session, spec.phase);

        let request = session.current_request();
        let assembly = {
            let (registry, view) = session.split_for_assembly(&request);
            self.assembler
                .assemble(
                    registry,
                    &view,
                    AssemblyRequest {
                        model_id,
                        collection: role.collection.as_deref(),
                        status_only: spec.status_only,
                    },
                )
                .await
        };
        for diagnostic in &assembly.diagnostics {
            session.logs_mut().history.append(SYSTEM_SENDER, diagnostic);
        }

        let prompt = build_prompt(&request, spec.instruction, caps, self.documents, &assembly.text);
        session
            .logs_mut()
            .transcript
            .append(SYSTEM_SENDER, format!("Prompt for {}:\n{}", role.name, prompt));

        let (text, invocation_failed) = match self.model.invoke(&prompt, &role.persona, model_id).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(role = %role.name, model = model_id, "model invocation failed: {}", e);
                let text = match self.recovery.handle(&AgentError::Invocation(e)) {
                    RecoveryAction::SubstituteText(text) => text,
                    other => format!("{other:?}"),
                };
                (text, true)
            }
        };
        session.logs_mut().append_internal(&role.name, &text);
        self.emit(OrchestratorEvent::Turn {
            session_id: session.id().to_string(),
            role: role.name.clone(),
            phase: spec.phase,
            iteration: session.iterations(),
            preview: text.chars().take(PREVIEW_CHARS).collect(),
        });

        // 只读角色的输出不含命令
        let report = if caps.is_empty() || invocation_failed {
            DispatchReport::default()
        } else {
            let extraction = extract(&text);
            let turn = TurnContext {
                role: &role.name,
                caps,
                collection: role.collection.as_deref(),
            };
            self.dispatcher.dispatch(session, &extraction, turn).await
        };

        if !report.outcomes.is_empty() {
            session
                .logs_mut()
                .append_internal(SYSTEM_SENDER, &report.summary());
            for outcome in &report.outcomes {
                self.emit(OrchestratorEvent::CommandResult {
                    session_id: session.id().to_string(),
                    tag: outcome.tag.clone(),
                    applied: outcome.applied,
                    result: outcome.result.clone(),
                });
            }
        }
        if report.responded {
            if let Some(last) = session.logs().user.last() {
                self.emit(OrchestratorEvent::Response {
                    session_id: session.id().to_string(),
                    role: last.sender.clone(),
                    text: last.text.clone(),
                });
            }
        }

        TurnResult {
            text,
            report,
            invocation_failed,
        }
    }
}

pub fn build_prompt(
    request: &str,
    instruction: &str,
    caps: CapabilitySet,
    documents: &[String],
    context: &str,
) -> String {
    let request = if request.trim().is_empty() {
        String::new()
    } else {
        format!("{USER_PROMPT_HEADER}\n{request}")
    };
    let commands = instructions_for(caps, documents);
    [request.as_str(), instruction, commands.as_str(), context]
        .into_iter()
        .map(str::trim_end)
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Capability;

    #[test]
    fn test_prompt_sections_in_order() {
        let caps = CapabilitySet::empty().with(Capability::Response);
        let prompt = build_prompt("Plot sales", "Do it.", caps, &[], "# **History**:\nhi\n---\n");
        let parts: Vec<&str> = prompt.split("\n\n---\n\n").collect();
        assert_eq!(parts[0], "# **User Prompt**:\nPlot sales");
        assert_eq!(parts[1], "Do it.");
        assert!(parts[2].contains("<response>"));
        assert!(prompt.ends_with("hi\n---"));
    }

    #[test]
    fn test_prompt_skips_empty_command_section() {
        let prompt = build_prompt("", "Judge.", CapabilitySet::empty(), &[], "ctx");
        assert_eq!(prompt, "Judge.\n\n---\n\nctx");
    }
}
