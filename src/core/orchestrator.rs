//! 编排器：会话状态机入口
//!
//! 对一条用户消息：Idle → [Planning] → Acting → [Assessing] → Responding → Idle。
//! Orchestrator 本身不可变（协作者都在 Arc 后面），可在多个 tokio 任务间共享；
//! 每个会话的可变状态都在 Session 中，以 `&mut Session` 保证同一会话的轮次不会并发。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::command::CommandDispatcher;
use crate::config::{AppConfig, OrchestratorSection};
use crate::core::{OrchestratorBuilder, Phase, RecoveryEngine, Session};
use crate::llm::{create_deepseek_client, MockModelClient, ModelClient, OpenAiClient};
use crate::memory::{ChatLogs, ContextAssembler, LongTermMemory, SYSTEM_SENDER};
use crate::react::{act_planned, act_unplanned, plan_request, respond, OrchestratorEvent, TurnEngine};
use crate::roles::RoleRoster;
use crate::tools::SafeFs;

/// 根据配置与环境变量选择模型后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_model_from_config(cfg: &AppConfig) -> Arc<dyn ModelClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock model client");
        return Arc::new(MockModelClient);
    }
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        tracing::info!("Using DeepSeek model client ({})", cfg.llm.model);
        Arc::new(create_deepseek_client(&cfg.llm))
    } else if use_openai {
        tracing::info!("Using OpenAI model client ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock model client");
        Arc::new(MockModelClient)
    }
}

pub struct Orchestrator {
    pub(crate) model: Arc<dyn ModelClient>,
    pub(crate) assembler: ContextAssembler,
    pub(crate) dispatcher: CommandDispatcher,
    pub(crate) roster: RoleRoster,
    pub(crate) settings: OrchestratorSection,
    pub(crate) default_model: String,
    pub(crate) max_prompt_tokens: usize,
    pub(crate) documents: Option<SafeFs>,
    pub(crate) long_term: Arc<dyn LongTermMemory>,
    pub(crate) chat_dir: Option<PathBuf>,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) events: Option<UnboundedSender<OrchestratorEvent>>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn roster(&self) -> &RoleRoster {
        &self.roster
    }

    pub fn settings(&self) -> &OrchestratorSection {
        &self.settings
    }

    /// 新会话共享长期记忆；配置了聊天目录时，记录保存在 `<chat_dir>/<session_id>/`
    pub fn new_session(&self) -> Session {
        let session = Session::new().with_long_term(self.long_term.clone());
        match &self.chat_dir {
            Some(dir) => {
                let logs = ChatLogs::persistent(&dir.join(session.id()));
                session.with_logs(logs)
            }
            None => session,
        }
    }

    fn engine<'a>(&'a self, documents: &'a [String]) -> TurnEngine<'a> {
        TurnEngine {
            model: self.model.as_ref(),
            assembler: &self.assembler,
            dispatcher: &self.dispatcher,
            recovery: &self.recovery,
            events: self.events.as_ref(),
            default_model: &self.default_model,
            documents,
        }
    }

    /// 工作区文档清单；目录遍历放到阻塞线程池执行
    async fn list_documents(&self) -> Vec<String> {
        let Some(fs) = self.documents.clone() else {
            return Vec::new();
        };
        match tokio::task::spawn_blocking(move || fs.document_paths()).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!("document scan failed: {}", e);
                Vec::new()
            }
        }
    }

    /// 处理一条用户消息，返回写入用户记录的回复（或替代的系统警告）
    pub async fn handle_message(&self, session: &mut Session, text: &str) -> String {
        session.begin_request();

        let tokens = self.assembler.counter().count(text, &self.default_model);
        if tokens > self.max_prompt_tokens {
            let notice = format!(
                "The message is too long ({tokens} tokens, at most {} allowed). Please shorten it or upload it as a document.",
                self.max_prompt_tokens
            );
            tracing::warn!(session = %session.id(), tokens, "user message rejected");
            session.logs_mut().append_all(SYSTEM_SENDER, &notice);
            session.terminate();
            return notice;
        }
        session.add_user_message(text);
        tracing::info!(session = %session.id(), "handling user message");

        let documents = self.list_documents().await;
        let engine = self.engine(&documents);

        let planned = self.settings.planning
            && self.roster.planner.is_some()
            && plan_request(&engine, session, &self.roster, &self.settings).await;
        if planned {
            act_planned(&engine, session, &self.roster, &self.settings).await;
        } else {
            act_unplanned(&engine, session, &self.roster, &self.settings).await;
        }

        let reply = respond(&engine, session, &self.roster, &self.settings).await;
        session.reset_plan();
        engine.enter(session, Phase::Idle);
        session.terminate();
        let (_, _, total_tokens) = self.model.token_usage();
        tracing::info!(
            session = %session.id(),
            iterations = session.iterations(),
            total_tokens,
            "request finished"
        );
        reply
    }
}
