//! 文档检索：Retriever 协作者与检索结果的标记序列化
//!
//! 检索结果序列化为 `<context>` / `<query_results>` 等根元素下的 `<item>` 列表。
//! 预算截断用二分查找最大前缀：序列化长度随条数单调不减，故 O(log N) 次计量即可。

use async_trait::async_trait;

use crate::command::markup::{escape_attribute, escape_text};
use crate::memory::long_term::tokenize_lower;

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub id: String,
    pub source: Option<String>,
    pub content: String,
}

impl Snippet {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: None,
            content: content.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn to_markup(&self) -> String {
        let mut out = format!("  <item id=\"{}\"", escape_attribute(&self.id));
        if let Some(source) = &self.source {
            out.push_str(&format!(" source=\"{}\"", escape_attribute(source)));
        }
        out.push('>');
        out.push_str(&escape_text(&self.content));
        out.push_str("\n  </item>\n");
        out
    }
}

/// 检索协作者：按查询从集合中返回按相关度排序的片段
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        collection: Option<&str>,
        n: usize,
    ) -> Result<Vec<Snippet>, String>;
}

/// 未接入检索时使用
#[derive(Debug, Clone, Default)]
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    async fn retrieve(&self, _query: &str, _collection: Option<&str>, _n: usize) -> Result<Vec<Snippet>, String> {
        Ok(Vec::new())
    }
}

/// 内存检索：按关键词重叠排序，集合名为空时检索全部
#[derive(Debug, Clone, Default)]
pub struct InMemoryRetriever {
    documents: Vec<(Option<String>, Snippet)>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, collection: Option<&str>, snippet: Snippet) -> Self {
        self.documents.push((collection.map(String::from), snippet));
        self
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, collection: Option<&str>, n: usize) -> Result<Vec<Snippet>, String> {
        let query_tokens = tokenize_lower(query);
        let mut scored: Vec<(usize, &Snippet)> = self
            .documents
            .iter()
            .filter(|(c, _)| collection.is_none() || c.as_deref() == collection)
            .map(|(_, s)| (query_tokens.intersection(&tokenize_lower(&s.content)).count(), s))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(n).map(|(_, s)| s.clone()).collect())
    }
}

/// 前 k 条渲染后的条目串拼成完整结果
fn bundle(items: &[String], k: usize, root: &str) -> String {
    format!("<{root}>\n{}</{root}>\n", items[..k].concat())
}

/// 空结果：只有根元素
pub fn empty_bundle(root: &str) -> String {
    bundle(&[], 0, root)
}

/// 求满足 `measure(k) <= budget` 的最大 k ∈ [0, n]；要求 measure 单调不减且 measure(0) <= budget
pub fn largest_fitting_prefix(n: usize, budget: usize, mut measure: impl FnMut(usize) -> usize) -> usize {
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if measure(mid) <= budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

/// 全部条目序列化（无预算）
pub fn snippets_to_markup(snippets: &[Snippet], root: &str) -> String {
    let items: Vec<String> = snippets.iter().map(Snippet::to_markup).collect();
    bundle(&items, items.len(), root)
}

/// 在预算内序列化尽可能多的前缀条目；预算小于空结果时直接返回空结果
pub fn fit_snippets(
    snippets: &[Snippet],
    root: &str,
    budget: usize,
    measure: &dyn Fn(&str) -> usize,
) -> String {
    let empty = empty_bundle(root);
    if budget < measure(&empty) {
        return empty;
    }
    let items: Vec<String> = snippets.iter().map(Snippet::to_markup).collect();
    let k = largest_fitting_prefix(items.len(), budget, |k| measure(&bundle(&items, k, root)));
    bundle(&items, k, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn snippets(n: usize) -> Vec<Snippet> {
        (0..n)
            .map(|i| Snippet::new(format!("doc-{i}"), "x".repeat(10 + i * 7)).with_source("kb"))
            .collect()
    }

    fn chars(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_prefix_is_unique_maximum() {
        let snips = snippets(12);
        let items: Vec<String> = snips.iter().map(Snippet::to_markup).collect();
        let len = |k: usize| chars(&bundle(&items, k, "context"));
        let empty = len(0);
        let full = len(items.len());
        for budget in (empty + 1)..full {
            let out = fit_snippets(&snips, "context", budget, &chars);
            let k = out.matches("<item ").count();
            assert!(len(k) <= budget, "budget {budget}");
            assert!(len(k + 1) > budget, "budget {budget}");
        }
    }

    #[test]
    fn test_logarithmic_oracle_calls() {
        let calls = Cell::new(0usize);
        let k = largest_fitting_prefix(1024, 500, |k| {
            calls.set(calls.get() + 1);
            k
        });
        assert_eq!(k, 500);
        assert!(calls.get() <= 11, "calls = {}", calls.get());
    }

    #[test]
    fn test_budget_below_empty_bundle() {
        let out = fit_snippets(&snippets(3), "context", 3, &chars);
        assert_eq!(out, "<context>\n</context>\n");
    }

    #[test]
    fn test_everything_fits() {
        let snips = snippets(3);
        let out = fit_snippets(&snips, "context", usize::MAX, &chars);
        assert_eq!(out, snippets_to_markup(&snips, "context"));
    }

    #[test]
    fn test_item_markup_escapes() {
        let out = snippets_to_markup(&[Snippet::new("1", "a < b").with_source("x&y")], "r");
        assert_eq!(out, "<r>\n  <item id=\"1\" source=\"x&amp;y\">a &lt; b\n  </item>\n</r>\n");
    }

    #[tokio::test]
    async fn test_in_memory_retriever_filters_collection() {
        let r = InMemoryRetriever::new()
            .with_document(Some("python"), Snippet::new("1", "reverse a linked list in python"))
            .with_document(Some("sql"), Snippet::new("2", "reverse order by clause"));
        let hits = r.retrieve("reverse list", Some("python"), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }
}
