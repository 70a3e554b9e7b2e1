//! 上下文装配
//!
//! 1. 按分数升序排列条目（分数见 ContextItem::score），低分先渲染，检索结果等高分条目靠后
//! 2. 固定条目总是渲染；非固定条目仅在 `已渲染 + 本条 + 预留 × 剩余固定条目数 < 预算` 时渲染
//! 3. 检索条目使用剩余预算，二分查找能装下的最大前缀
//! 4. 非状态轮次：所有条目年龄 +1，超过上限的非固定条目被淘汰；状态轮次跳过检索且不做任何修改

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::ContextSection;
use crate::memory::context::{ContextItem, ContextRegistry, ContextValue, SessionView};
use crate::memory::retrieval::{fit_snippets, Retriever};
use crate::memory::TokenCounter;

const RETRIEVAL_HEADER: &str = "Whenever possible, use the following context to answer the User's query.\n\
The context is sorted by relevance. Reference the context source you used in the user response.\n";

/// 装配预算与淘汰参数
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub max_context_tokens: usize,
    pub max_chat_tokens: usize,
    pub pinned_headroom_tokens: usize,
    pub eviction_age: u32,
    pub retrieval_results: usize,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self::from(&ContextSection::default())
    }
}

impl From<&ContextSection> for AssemblerSettings {
    fn from(cfg: &ContextSection) -> Self {
        Self {
            max_context_tokens: cfg.max_context_tokens,
            max_chat_tokens: cfg.max_chat_tokens,
            pinned_headroom_tokens: cfg.pinned_headroom_tokens,
            eviction_age: cfg.eviction_age,
            retrieval_results: cfg.retrieval_results,
        }
    }
}

/// 装配结果：上下文文本与需要写入聊天记录的诊断信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub text: String,
    pub diagnostics: Vec<String>,
}

/// 一次装配的调用参数
#[derive(Debug, Clone, Copy)]
pub struct AssemblyRequest<'a> {
    pub model_id: &'a str,
    /// 文档检索集合
    pub collection: Option<&'a str>,
    /// 状态轮次：供评审等只读角色使用
    pub status_only: bool,
}

pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
    retriever: Arc<dyn Retriever>,
    settings: AssemblerSettings,
}

impl ContextAssembler {
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        retriever: Arc<dyn Retriever>,
        settings: AssemblerSettings,
    ) -> Self {
        Self {
            counter,
            retriever,
            settings,
        }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    pub async fn assemble(
        &self,
        registry: &mut ContextRegistry,
        view: &SessionView<'_>,
        req: AssemblyRequest<'_>,
    ) -> Assembly {
        let count = |s: &str| self.counter.count(s, req.model_id);
        let mut assembly = Assembly::default();

        let text = {
            let items = registry.items();
            let mut order: Vec<usize> = (0..items.len())
                .filter(|&i| !(req.status_only && items[i].is_retrieval()))
                .collect();
            order.sort_by(|&a, &b| {
                items[a]
                    .score()
                    .partial_cmp(&items[b].score())
                    .unwrap_or(Ordering::Equal)
            });

            let mut pinned_remaining = order.iter().filter(|&&i| items[i].pinned).count();
            let mut out = String::new();

            for &idx in &order {
                let item = &items[idx];
                let block = match &item.value {
                    ContextValue::Retrieval => {
                        let remaining = self.settings.max_context_tokens.saturating_sub(count(&out));
                        let query = format!("{}\n---\n{}", view.request, out);
                        let body = match self
                            .retrieval_block(&query, req, remaining)
                            .await
                        {
                            Ok(body) => body,
                            Err(e) => {
                                tracing::warn!(item = %item.name, "retrieval failed: {}", e);
                                assembly
                                    .diagnostics
                                    .push(format!("Error when attempting to query the context: {e}"));
                                String::new()
                            }
                        };
                        render_block(item, &body)
                    }
                    value => render_block(item, &self.render_value(value, view, req.model_id)),
                };

                if item.pinned {
                    out.push_str(&block);
                    pinned_remaining -= 1;
                } else if count(&out)
                    + count(&block)
                    + self.settings.pinned_headroom_tokens * pinned_remaining
                    < self.settings.max_context_tokens
                {
                    out.push_str(&block);
                }
            }
            out
        };
        assembly.text = text;

        if !req.status_only {
            let limit = self.settings.eviction_age;
            registry.items_mut().retain_mut(|item| {
                item.age += 1;
                let keep = item.pinned || item.age <= limit;
                if !keep {
                    tracing::debug!(item = %item.name, age = item.age, "context item evicted");
                }
                keep
            });
        }

        assembly
    }

    fn render_value(&self, value: &ContextValue, view: &SessionView<'_>, model_id: &str) -> String {
        match value {
            ContextValue::Text(text) => text.clone(),
            ContextValue::Producer(produce) => produce(view),
            ContextValue::ChatLog(kind) => view.logs.get(*kind).tail_as_markup(
                self.settings.max_chat_tokens,
                self.counter.as_ref(),
                model_id,
            ),
            ContextValue::Retrieval => String::new(),
        }
    }

    async fn retrieval_block(
        &self,
        query: &str,
        req: AssemblyRequest<'_>,
        budget: usize,
    ) -> Result<String, String> {
        let snippets = self
            .retriever
            .retrieve(query, req.collection, self.settings.retrieval_results)
            .await?;
        let measure = |s: &str| self.counter.count(s, req.model_id);
        let remaining = budget.saturating_sub(measure(RETRIEVAL_HEADER));
        Ok(format!(
            "{RETRIEVAL_HEADER}{}",
            fit_snippets(&snippets, "context", remaining, &measure)
        ))
    }
}

fn render_block(item: &ContextItem, body: &str) -> String {
    match item.value {
        ContextValue::ChatLog(_) => format!(
            "# **{}**:\nChat with {}\n{}\n---\n",
            item.name, item.description, body
        ),
        _ => format!("# **{}**:\n{}\n---\n", item.name, body),
    }
}
