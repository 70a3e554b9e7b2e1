//! 工具注册表
//!
//! 需要外部执行器的命令（code、document）实现 Tool trait，由 ToolRegistry 按命令标签注册与查找，
//! ToolExecutor 在调用时加超时并统一转 AgentError。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Command;
use crate::memory::CodeRecord;

/// 一次工具调用：原始命令、发起角色、解析好的代码导入
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub command: Command,
    pub role: String,
    pub imports: Vec<CodeRecord>,
}

impl ToolRequest {
    pub fn new(command: Command, role: impl Into<String>) -> Self {
        Self {
            command,
            role: role.into(),
            imports: Vec::new(),
        }
    }

    pub fn with_imports(mut self, imports: Vec<CodeRecord>) -> Self {
        self.imports = imports;
        self
    }
}

/// 工具 trait：处理的命令标签、描述、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 处理的命令标签（如 "code"、"document"）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, request: ToolRequest) -> Result<String, String>;
}

/// 工具注册表：按标签存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, request: ToolRequest) -> Result<String, String> {
        let name = request.command.tag.clone();
        let tool = self
            .tools
            .get(&name)
            .ok_or_else(|| format!("No executor is configured for `{name}`"))?;
        tool.execute(request).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}
