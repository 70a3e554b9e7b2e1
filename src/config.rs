//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ORCHESTRATOR__PLANNING=true`）。
//! 配置在构建 Orchestrator 时按值传入，运行期间不再修改；多个会话共享同一份不可变配置。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub context: ContextSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、工作目录、聊天记录目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// 聊天记录持久化目录；未设置时仅保存在内存
    pub chat_dir: Option<PathBuf>,
}

impl AppSection {
    pub fn workspace(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// [llm] 段：后端选择与各角色模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 评审角色使用的模型（与执行角色分离，避免自我认同）；未设置时沿用 model
    pub critic_model: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            critic_model: None,
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

/// [context] 段：上下文装配的 token 预算
#[derive(Debug, Clone, Deserialize)]
pub struct ContextSection {
    /// 整个上下文块的 token 上限
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// 聊天记录尾部渲染上限
    #[serde(default = "default_max_chat_tokens")]
    pub max_chat_tokens: usize,
    /// 为每个尚未渲染的固定项预留的 token
    #[serde(default = "default_pinned_headroom_tokens")]
    pub pinned_headroom_tokens: usize,
    /// 非固定项超过该年龄后被淘汰
    #[serde(default = "default_eviction_age")]
    pub eviction_age: u32,
    /// 检索条数
    #[serde(default = "default_retrieval_results")]
    pub retrieval_results: usize,
    /// 单条用户消息的 token 上限
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            max_chat_tokens: default_max_chat_tokens(),
            pinned_headroom_tokens: default_pinned_headroom_tokens(),
            eviction_age: default_eviction_age(),
            retrieval_results: default_retrieval_results(),
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

fn default_max_context_tokens() -> usize {
    12_000
}

fn default_max_chat_tokens() -> usize {
    4_000
}

fn default_pinned_headroom_tokens() -> usize {
    1_000
}

fn default_eviction_age() -> u32 {
    10
}

fn default_retrieval_results() -> usize {
    5
}

fn default_max_prompt_tokens() -> usize {
    8_000
}

/// [orchestrator] 段：规划开关与各阶段迭代上限
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default)]
    pub planning: bool,
    /// 规划阶段是否由评审角色复核计划
    #[serde(default = "default_plan_review")]
    pub plan_review: bool,
    /// 计划确定后由回复角色向用户概述计划
    #[serde(default = "default_announce_plan")]
    pub announce_plan: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_planning_iterations")]
    pub max_planning_iterations: usize,
    #[serde(default = "default_max_step_iterations")]
    pub max_step_iterations: usize,
    #[serde(default = "default_max_responding_iterations")]
    pub max_responding_iterations: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            planning: false,
            plan_review: default_plan_review(),
            announce_plan: default_announce_plan(),
            max_iterations: default_max_iterations(),
            max_planning_iterations: default_max_planning_iterations(),
            max_step_iterations: default_max_step_iterations(),
            max_responding_iterations: default_max_responding_iterations(),
        }
    }
}

fn default_plan_review() -> bool {
    true
}

fn default_announce_plan() -> bool {
    true
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_planning_iterations() -> usize {
    5
}

fn default_max_step_iterations() -> usize {
    5
}

fn default_max_responding_iterations() -> usize {
    2
}

/// [tools] 段：工具超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_ceilings() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_iterations, 10);
        assert_eq!(cfg.orchestrator.max_planning_iterations, 5);
        assert_eq!(cfg.orchestrator.max_responding_iterations, 2);
        assert_eq!(cfg.context.eviction_age, 10);
        assert!(!cfg.orchestrator.planning);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            "[orchestrator]\nplanning = true\nmax_iterations = 3\n\n[context]\nmax_context_tokens = 500\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert!(cfg.orchestrator.planning);
        assert_eq!(cfg.orchestrator.max_iterations, 3);
        assert_eq!(cfg.orchestrator.max_step_iterations, 5);
        assert_eq!(cfg.context.max_context_tokens, 500);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }
}
