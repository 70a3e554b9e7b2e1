//! 编排器构建器：统一的初始化逻辑
//!
//! 配置对象在构建时按值传入，之后不再修改；角色阵容、能力集合、迭代上限与规划开关都在这里确定。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::command::CommandDispatcher;
use crate::config::{load_config, AppConfig};
use crate::core::{create_model_from_config, AgentError, Orchestrator, RecoveryEngine};
use crate::llm::ModelClient;
use crate::memory::{
    AssemblerSettings, ContextAssembler, InMemoryLongTerm, LongTermMemory, NoopRetriever, Retriever,
    TokenCounter, TokenEstimator,
};
use crate::react::OrchestratorEvent;
use crate::roles::{Role, RoleKind, RoleRoster};
use crate::tools::{DocumentTool, SafeFs, Tool, ToolExecutor, ToolRegistry};

/// 默认长期记忆的条目上限
const DEFAULT_LONG_TERM_ENTRIES: usize = 1000;

pub struct OrchestratorBuilder {
    config: AppConfig,
    model: Option<Arc<dyn ModelClient>>,
    counter: Arc<dyn TokenCounter>,
    retriever: Arc<dyn Retriever>,
    long_term: Option<Arc<dyn LongTermMemory>>,
    tools: ToolRegistry,
    roster: RoleRoster,
    workspace: Option<PathBuf>,
    events: Option<UnboundedSender<OrchestratorEvent>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            model: None,
            counter: Arc::new(TokenEstimator),
            retriever: Arc::new(NoopRetriever),
            long_term: None,
            tools: ToolRegistry::new(),
            roster: RoleRoster::default(),
            workspace: None,
            events: None,
        }
    }

    /// 从配置创建：工作目录下的文档工具、模型后端按配置与环境变量选择
    pub fn from_config(config: AppConfig) -> Self {
        let workspace = config.app.workspace();
        Self::new().with_config(config).with_workspace(workspace)
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_long_term(mut self, long_term: Arc<dyn LongTermMemory>) -> Self {
        self.long_term = Some(long_term);
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_roster(mut self, roster: RoleRoster) -> Self {
        self.roster = roster;
        self
    }

    /// 替换阵容中的某个角色
    pub fn with_role(mut self, kind: RoleKind, role: Role) -> Self {
        match kind {
            RoleKind::Planner => self.roster.planner = Some(role),
            RoleKind::Actor => self.roster.actor = role,
            RoleKind::Critic => self.roster.critic = Some(role),
            RoleKind::Responder => self.roster.responder = role,
        }
        self
    }

    pub fn without_critic(mut self) -> Self {
        self.roster.critic = None;
        self
    }

    /// 从目录读取人设覆盖：planner.md / actor.md / critic.md / responder.md，缺失的文件保持默认
    pub fn with_personas_from_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let read = |name: &str| std::fs::read_to_string(dir.as_ref().join(name)).ok();
        if let (Some(text), Some(planner)) = (read("planner.md"), self.roster.planner.as_mut()) {
            planner.persona = text;
        }
        if let Some(text) = read("actor.md") {
            self.roster.actor.persona = text;
        }
        if let (Some(text), Some(critic)) = (read("critic.md"), self.roster.critic.as_mut()) {
            critic.persona = text;
        }
        if let Some(text) = read("responder.md") {
            self.roster.responder.persona = text;
        }
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_planning(mut self, planning: bool) -> Self {
        self.config.orchestrator.planning = planning;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.orchestrator.max_iterations = max_iterations;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let settings = self.config.orchestrator.clone();
        if settings.max_iterations == 0 || settings.max_responding_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations and max_responding_iterations must be at least 1".into(),
            ));
        }
        if settings.planning && settings.max_planning_iterations == 0 {
            return Err(AgentError::Config(
                "max_planning_iterations must be at least 1 when planning is enabled".into(),
            ));
        }

        let mut roster = self.roster;
        if let (Some(model), Some(critic)) = (&self.config.llm.critic_model, roster.critic.as_mut()) {
            if critic.model_id.is_none() {
                critic.model_id = Some(model.clone());
            }
        }

        let mut tools = self.tools;
        let documents = match &self.workspace {
            Some(root) => {
                if let Err(e) = std::fs::create_dir_all(root) {
                    tracing::warn!(path = %root.display(), "workspace not created: {}", e);
                }
                if !tools.contains("document") {
                    tools.register(DocumentTool::new(root));
                }
                Some(SafeFs::new(root))
            }
            None => None,
        };
        tracing::info!(tools = ?tools.tool_names(), planning = settings.planning, "orchestrator tools");

        let executor = Arc::new(ToolExecutor::new(tools, self.config.tools.tool_timeout_secs));
        let dispatcher = CommandDispatcher::new(executor, self.retriever.clone())
            .with_query_results(self.config.context.retrieval_results);
        let assembler = ContextAssembler::new(
            self.counter,
            self.retriever,
            AssemblerSettings::from(&self.config.context),
        );
        let model = self
            .model
            .unwrap_or_else(|| create_model_from_config(&self.config));
        let long_term = self
            .long_term
            .unwrap_or_else(|| Arc::new(InMemoryLongTerm::new(DEFAULT_LONG_TERM_ENTRIES)));

        Ok(Orchestrator {
            model,
            assembler,
            dispatcher,
            roster,
            settings,
            default_model: self.config.llm.model.clone(),
            max_prompt_tokens: self.config.context.max_prompt_tokens,
            documents,
            long_term,
            chat_dir: self.config.app.chat_dir.clone(),
            recovery: RecoveryEngine::new(),
            events: self.events,
        })
    }
}

/// 便捷函数：加载配置（失败时用默认值）并创建构建器
pub fn create_orchestrator_builder(config_path: Option<PathBuf>) -> OrchestratorBuilder {
    let config = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    OrchestratorBuilder::from_config(config).with_personas_from_dir("config/prompts")
}
