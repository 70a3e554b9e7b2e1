//! 长期记忆：跨会话保存的知识条目（内容、时间戳、写入角色）
//!
//! 支持 add(entry) 与 search(query, k)；当前实现为 InMemoryLongTerm（关键词重叠），
//! 真实向量库作为外部协作者接入同一 trait。

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    /// 写入该条目的角色名
    pub role: String,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            role: role.into(),
        }
    }
}

/// 长期记忆 trait：支持写入与相似度检索
pub trait LongTermMemory: Send + Sync {
    fn add(&self, entry: MemoryEntry);

    /// 按查询检索最相关的 k 条
    fn search(&self, query: &str, k: usize) -> Vec<MemoryEntry>;
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopLongTerm;

impl LongTermMemory for NoopLongTerm {
    fn add(&self, _entry: MemoryEntry) {}

    fn search(&self, _query: &str, _k: usize) -> Vec<MemoryEntry> {
        Vec::new()
    }
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
pub(crate) fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// 简单内存实现：按关键词重叠检索（无真实向量）
#[derive(Clone)]
pub struct InMemoryLongTerm {
    store: Arc<RwLock<Vec<(MemoryEntry, HashSet<String>)>>>,
    max_entries: usize,
}

impl InMemoryLongTerm {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Vec::new())),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LongTermMemory for InMemoryLongTerm {
    fn add(&self, entry: MemoryEntry) {
        if entry.content.trim().is_empty() {
            return;
        }
        let tokens = tokenize_lower(&entry.content);
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.push((entry, tokens));
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
    }

    fn search(&self, query: &str, k: usize) -> Vec<MemoryEntry> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(usize, &MemoryEntry)> = store
            .iter()
            .map(|(entry, doc_tokens)| (query_tokens.intersection(doc_tokens).count(), entry))
            .filter(|(s, _)| *s > 0)
            .collect();
        // 分数相同时新条目优先
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.timestamp.cmp(&a.1.timestamp)));
        scored.into_iter().take(k).map(|(_, e)| e.clone()).collect()
    }
}

impl Default for InMemoryLongTerm {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_by_overlap() {
        let mem = InMemoryLongTerm::default();
        mem.add(MemoryEntry::new("The user prefers plotly charts", "Tinker Agent"));
        mem.add(MemoryEntry::new("Sales data lives in uploads/sales.csv", "Tinker Agent"));
        let hits = mem.search("which charts does the user like?", 1);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("plotly"));
        assert_eq!(hits[0].role, "Tinker Agent");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mem = InMemoryLongTerm::new(2);
        mem.add(MemoryEntry::new("alpha fact", "a"));
        mem.add(MemoryEntry::new("beta fact", "a"));
        mem.add(MemoryEntry::new("gamma fact", "a"));
        assert_eq!(mem.len(), 2);
        assert!(mem.search("alpha", 5).is_empty());
    }

    #[test]
    fn test_blank_entries_ignored() {
        let mem = InMemoryLongTerm::default();
        mem.add(MemoryEntry::new("   ", "a"));
        assert!(mem.is_empty());
    }
}
