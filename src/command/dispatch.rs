//! 命令分派
//!
//! 对一次提取的全部命令做整批检查后逐条执行：
//! - `response` 与 code / query / document / plan 同批出现时整批拒绝，不改变任何状态
//! - `next_step` 不能与 `plan` 或阻塞型工具调用同批
//! - 本批存在解析失败时，`response` 与 `next_step` 被拦下，要求先修正
//! - 未知标签返回 "Command not recognized."；未授权的命令返回说明文本
//!
//! 工具错误在命令边界被捕获，经 RecoveryEngine 转成诊断文本，不向上传播。

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::command::markup::{escape_attribute, escape_text};
use crate::command::{Command, Extraction};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, Session};
use crate::memory::context::{CODE_RESULTS, EXTRACTION_FAILURE};
use crate::memory::{snippets_to_markup, ContextItem, MemoryEntry, Retriever, SYSTEM_SENDER};
use crate::roles::{Capability, CapabilitySet};
use crate::tools::{ToolExecutor, ToolRequest};

pub const NOT_RECOGNIZED: &str = "Command not recognized.";
pub const RESPONSE_CONFLICT: &str =
    "Response command cannot be used together with code, query, document or plan commands.";
pub const PLAN_NEXT_STEP_CONFLICT: &str = "Plan and Next Step commands cannot be used together.";
pub const NEXT_STEP_TOOL_CONFLICT: &str =
    "Next Step command cannot be used together with code, query or document commands. Wait for their results first.";
pub const FIX_EXTRACTION_FIRST: &str = "Extraction of a command failed. Fix it, before replying!";

/// 本轮的调用方：角色名、可用能力、检索集合
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub role: &'a str,
    pub caps: CapabilitySet,
    pub collection: Option<&'a str>,
}

/// 单条命令的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub tag: String,
    pub result: String,
    /// 命令是否真正生效
    pub applied: bool,
}

impl CommandOutcome {
    fn applied(tag: &str, result: impl Into<String>) -> Self {
        Self {
            tag: tag.to_string(),
            result: result.into(),
            applied: true,
        }
    }

    fn refused(tag: &str, result: impl Into<String>) -> Self {
        Self {
            tag: tag.to_string(),
            result: result.into(),
            applied: false,
        }
    }
}

/// 一批命令的汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<CommandOutcome>,
    /// 有回复写入用户可见记录
    pub responded: bool,
    /// 计划前进了一步
    pub advanced: bool,
    /// 执行过阻塞型工具（code / query / document）
    pub tool_used: bool,
    pub plan_set: bool,
    /// 整批因互斥规则被拒绝
    pub rejected: bool,
    pub extraction_failed: bool,
}

impl DispatchReport {
    /// 汇总为一段写入聊天记录的文本
    pub fn summary(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| format!("<{}> {}", o.tag, o.result))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct CommandDispatcher {
    tools: Arc<ToolExecutor>,
    retriever: Arc<dyn Retriever>,
    query_results: usize,
    recovery: RecoveryEngine,
}

impl CommandDispatcher {
    pub fn new(tools: Arc<ToolExecutor>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            tools,
            retriever,
            query_results: 5,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn with_query_results(mut self, n: usize) -> Self {
        self.query_results = n;
        self
    }

    pub async fn dispatch(
        &self,
        session: &mut Session,
        extraction: &Extraction,
        turn: TurnContext<'_>,
    ) -> DispatchReport {
        let mut report = DispatchReport {
            extraction_failed: extraction.has_errors(),
            ..Default::default()
        };

        for err in &extraction.errors {
            tracing::debug!(tag = %err.tag, reason = %err.reason, "extraction error");
            let text = match self.recovery.handle(&AgentError::from(err.clone())) {
                RecoveryAction::InjectDiagnostic(msg) => msg,
                other => format!("{other:?}"),
            };
            session.registry_mut().upsert(
                ContextItem::text(EXTRACTION_FAILURE, text.clone())
                    .with_description("The last command that could not be parsed")
                    .with_importance(8.0),
            );
            session.logs_mut().append_internal(SYSTEM_SENDER, &text);
        }

        let has = |tag: &str| extraction.tags().any(|t| t == tag);
        if has("response") && ["code", "query", "document", "plan"].iter().any(|t| has(*t)) {
            tracing::warn!(role = turn.role, "response combined with other commands, batch rejected");
            let text = self.conflict(RESPONSE_CONFLICT);
            report.rejected = true;
            report.outcomes = extraction
                .commands
                .iter()
                .map(|c| CommandOutcome::refused(&c.tag, text.clone()))
                .collect();
            return report;
        }
        let blocking_in_batch = ["code", "query", "document"].iter().any(|t| has(*t));
        let plan_in_batch = has("plan");

        for command in &extraction.commands {
            let tag = command.tag.as_str();
            let Some(cap) = Capability::from_tag(tag) else {
                report.outcomes.push(CommandOutcome::refused(tag, NOT_RECOGNIZED));
                continue;
            };
            if !turn.caps.contains(cap) {
                report.outcomes.push(CommandOutcome::refused(
                    tag,
                    format!("Command {tag} is not available to {} right now.", turn.role),
                ));
                continue;
            }
            if report.extraction_failed && matches!(tag, "response" | "next_step") {
                report.outcomes.push(CommandOutcome::refused(tag, FIX_EXTRACTION_FIRST));
                continue;
            }
            if tag == "next_step" && plan_in_batch {
                let text = self.conflict(PLAN_NEXT_STEP_CONFLICT);
                report.outcomes.push(CommandOutcome::refused(tag, text));
                continue;
            }
            if tag == "next_step" && blocking_in_batch {
                let text = self.conflict(NEXT_STEP_TOOL_CONFLICT);
                report.outcomes.push(CommandOutcome::refused(tag, text));
                continue;
            }

            if cap.is_blocking_tool() {
                report.tool_used = true;
            }
            let outcome = match self.run(session, command, turn, &mut report).await {
                Ok(result) => CommandOutcome::applied(tag, result),
                Err(err) => {
                    tracing::warn!(tag, "command failed: {}", err);
                    let detail = match self.recovery.handle(&err) {
                        RecoveryAction::InjectDiagnostic(msg) => msg,
                        _ => err.to_string(),
                    };
                    CommandOutcome::refused(tag, format!("Error executing command {tag}: {detail}"))
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    /// 批内冲突：本轮不生效，把说明交回角色重试
    fn conflict(&self, message: &str) -> String {
        let err = AgentError::CommandConflict(message.to_string());
        match self.recovery.handle(&err) {
            RecoveryAction::RetryTurn(text) => text,
            _ => err.to_string(),
        }
    }

    async fn run(
        &self,
        session: &mut Session,
        command: &Command,
        turn: TurnContext<'_>,
        report: &mut DispatchReport,
    ) -> Result<String, AgentError> {
        match command.tag.as_str() {
            "short_memory" => {
                session.set_scratch(command.body.trim());
                Ok("Short term memory updated successfully.".into())
            }
            "long_memory" => {
                let content = command.body.trim();
                if content.is_empty() {
                    return Err(AgentError::ToolExecution("Memory content is empty.".into()));
                }
                session.long_term().add(MemoryEntry::new(content, turn.role));
                Ok("Long term memory updated successfully.".into())
            }
            "query" => self.query(session, command, turn).await,
            "document" => self.document(session, command, turn).await,
            "code" => self.code(session, command, turn).await,
            "plan" => {
                let steps: Vec<String> = command
                    .children_named("step")
                    .map(|s| s.body.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if steps.is_empty() {
                    return Err(AgentError::ToolExecution(
                        "A plan needs at least one <step> element.".into(),
                    ));
                }
                session.set_plan(steps);
                report.plan_set = true;
                Ok("Plan created or updated.".into())
            }
            "next_step" => {
                if !session.plan().is_set() {
                    return Err(AgentError::ToolExecution("There is no plan to advance.".into()));
                }
                if session.next_step() {
                    report.advanced = true;
                    Ok("Now working on next step.".into())
                } else {
                    Ok("The plan is already complete.".into())
                }
            }
            "response" => {
                let text = command.body.trim();
                if text.is_empty() {
                    return Err(AgentError::ToolExecution("The response is empty.".into()));
                }
                session.logs_mut().user.append(turn.role, text);
                report.responded = true;
                Ok("Response added to chat history.".into())
            }
            other => Err(AgentError::ToolExecution(format!("{other}: {NOT_RECOGNIZED}"))),
        }
    }

    async fn query(
        &self,
        session: &mut Session,
        command: &Command,
        turn: TurnContext<'_>,
    ) -> Result<String, AgentError> {
        let query = command.body.trim();
        if query.is_empty() {
            return Err(AgentError::ToolExecution("The query is empty.".into()));
        }
        let kind = command
            .attr_str("type")
            .unwrap_or_else(|| "documents".to_string());
        let text = match kind.as_str() {
            "documents" => {
                let snippets = self
                    .retriever
                    .retrieve(query, turn.collection, self.query_results)
                    .await
                    .map_err(AgentError::ToolExecution)?;
                format!(
                    "Query results for `{query}`:\n{}\nPlease reference the source in your answer.\n",
                    snippets_to_markup(&snippets, "documents")
                )
            }
            "memory" => {
                let mut xml = String::from("<memory>\n");
                for entry in session.long_term().search(query, self.query_results) {
                    xml.push_str(&format!(
                        "  <item role=\"{}\" timestamp=\"{}\">{}</item>\n",
                        escape_attribute(&entry.role),
                        entry.timestamp,
                        escape_text(&entry.content)
                    ));
                }
                xml.push_str("</memory>\n");
                format!("Query results for `{query}`:\n{xml}")
            }
            other => {
                return Err(AgentError::ToolExecution(format!(
                    "Unknown query type `{other}`. Use `documents` or `memory`."
                )))
            }
        };
        session.registry_mut().upsert(
            ContextItem::text(format!("{kind} Query Results"), text)
                .with_description(format!("Results of the last {kind} query"))
                .with_importance(3.0),
        );
        Ok("Query executed successfully.".into())
    }

    async fn document(
        &self,
        session: &mut Session,
        command: &Command,
        turn: TurnContext<'_>,
    ) -> Result<String, AgentError> {
        let Some(path) = command.attr_str("filepath") else {
            return Ok("Error: Document could not be retrieved. Filepath not provided.".into());
        };
        let output = self
            .tools
            .execute(ToolRequest::new(command.clone(), turn.role))
            .await?;
        let name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(path.clone());
        session.registry_mut().upsert(
            ContextItem::text(format!("Document Analysis Results of {name}"), output)
                .with_description(format!("Contents of {path}"))
                .with_importance(3.0),
        );
        Ok("Document analysis executed successfully.".into())
    }

    async fn code(
        &self,
        session: &mut Session,
        command: &Command,
        turn: TurnContext<'_>,
    ) -> Result<String, AgentError> {
        let imports = command
            .attributes
            .get("import")
            .map(|spec| session.ledger().resolve_imports(spec))
            .unwrap_or_default();
        let seq = session.ledger_mut().record(
            command.attr_str("tag"),
            command.attr_str("version"),
            command.body.clone(),
        );
        let result = self
            .tools
            .execute(ToolRequest::new(command.clone(), turn.role).with_imports(imports))
            .await;
        let (text, outcome) = match result {
            Ok(out) => (out.clone(), Ok("Code execution completed".to_string())),
            Err(err) => (err.to_string(), Err(err)),
        };
        session.ledger_mut().set_result(seq, text.clone());
        let mut attrs = String::new();
        for key in ["tag", "version"] {
            if let Some(v) = command.attr_str(key) {
                attrs.push_str(&format!(" {key}=\"{}\"", escape_attribute(&v)));
            }
        }
        session.registry_mut().upsert(
            ContextItem::text(
                CODE_RESULTS,
                format!("<code_result{attrs}>\n{}\n</code_result>", escape_text(&text)),
            )
            .with_description("Output of the last code execution")
            .with_importance(1.0),
        );
        outcome
    }
}
