//! 上下文条目注册表
//!
//! 每个条目有名称（唯一键）、值、描述、年龄、重要度与是否固定。
//! 值可以是字面文本、读取会话视图的生成函数、某份聊天记录的视图，或检索结果。
//! 同名写入替换旧条目；非固定条目年龄超过上限后被装配器淘汰。

use std::fmt;
use std::sync::Arc;

use crate::command::markup::{escape_attribute, escape_text};
use crate::memory::{ChatLogKind, ChatLogs, LongTermMemory, Plan};

pub const HISTORY: &str = "History";
pub const SHORT_TERM_MEMORY: &str = "Short-Term Memory";
pub const LONG_TERM_MEMORY: &str = "Long-Term Memory";
pub const CONTEXT_DUMP: &str = "Context Dump";
pub const PLAN: &str = "Plan";
pub const EXTRACTION_FAILURE: &str = "Extraction Failure";
pub const CODE_RESULTS: &str = "Code Results";

/// 生成函数读取的会话只读视图
pub struct SessionView<'a> {
    pub plan: &'a Plan,
    pub logs: &'a ChatLogs,
    pub scratch: &'a str,
    pub long_term: &'a dyn LongTermMemory,
    /// 当前用户请求，用于长期记忆与文档检索
    pub request: &'a str,
}

pub type Producer = Arc<dyn Fn(&SessionView<'_>) -> String + Send + Sync>;

#[derive(Clone)]
pub enum ContextValue {
    Text(String),
    Producer(Producer),
    ChatLog(ChatLogKind),
    /// 按剩余预算装入的文档检索结果
    Retrieval,
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ContextValue::Producer(_) => f.write_str("Producer(..)"),
            ContextValue::ChatLog(kind) => f.debug_tuple("ChatLog").field(kind).finish(),
            ContextValue::Retrieval => f.write_str("Retrieval"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextItem {
    pub name: String,
    pub value: ContextValue,
    pub description: String,
    /// 自上次刷新以来经过的装配轮数
    pub age: u32,
    pub importance: f64,
    pub pinned: bool,
}

impl ContextItem {
    pub fn new(name: impl Into<String>, value: ContextValue) -> Self {
        Self {
            name: name.into(),
            value,
            description: String::new(),
            age: 0,
            importance: 5.0,
            pinned: false,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, ContextValue::Text(text.into()))
    }

    pub fn producer<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&SessionView<'_>) -> String + Send + Sync + 'static,
    {
        Self::new(name, ContextValue::Producer(Arc::new(f)))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = age;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// 排序分数：`1 / (1 + exp(-0.01 · (age² + importance² + max(0, importance − 8.5)⁴)))`
    pub fn score(&self) -> f64 {
        let age = f64::from(self.age);
        let cliff = (self.importance - 8.5).max(0.0);
        let x = age.powi(2) + self.importance.powi(2) + cliff.powi(4);
        1.0 / (1.0 + (-0.01 * x).exp())
    }

    pub fn is_retrieval(&self) -> bool {
        matches!(self.value, ContextValue::Retrieval)
    }
}

/// 条目注册表，保持插入顺序（排序稳定时作为次序依据）
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    items: Vec<ContextItem>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 默认条目：History、Short-Term Memory、Long-Term Memory、Context Dump
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.upsert(
            ContextItem::new(HISTORY, ContextValue::ChatLog(ChatLogKind::History))
                .with_description("the User and the other agents")
                .with_importance(0.0)
                .pinned(),
        );
        registry.upsert(
            ContextItem::producer(SHORT_TERM_MEMORY, |view| {
                format!("<short_memory>{}</short_memory>", escape_text(view.scratch))
            })
            .with_description("Scratch notes for the current task")
            .with_importance(3.0)
            .pinned(),
        );
        registry.upsert(
            ContextItem::producer(LONG_TERM_MEMORY, |view| {
                let mut out = String::from("<long_memory>\n");
                for entry in view.long_term.search(view.request, 1) {
                    out.push_str(&format!(
                        "  <item role=\"{}\">{}</item>\n",
                        escape_attribute(&entry.role),
                        escape_text(&entry.content)
                    ));
                }
                out.push_str("</long_memory>");
                out
            })
            .with_description("Recalled long-term memory")
            .with_importance(9.0)
            .pinned(),
        );
        registry.upsert(
            ContextItem::new(CONTEXT_DUMP, ContextValue::Retrieval)
                .with_description("Retrieved documents")
                .with_age(10)
                .with_importance(10.0)
                .pinned(),
        );
        registry
    }

    /// 同名替换（保留原位置），否则追加
    pub fn upsert(&mut self, item: ContextItem) {
        match self.items.iter_mut().find(|i| i.name == item.name) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// 年龄归零
    pub fn touch(&mut self, name: &str) {
        if let Some(item) = self.items.iter_mut().find(|i| i.name == name) {
            item.age = 0;
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContextItem> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ContextItem> {
        let idx = self.items.iter().position(|i| i.name == name)?;
        Some(self.items.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.name.clone()).collect()
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<ContextItem> {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
