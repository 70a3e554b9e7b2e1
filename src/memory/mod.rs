//! 记忆层：聊天记录、计划、上下文条目与装配、长期记忆、文档检索、代码账本、持久化

pub mod assembler;
pub mod chat_log;
pub mod code_ledger;
pub mod context;
pub mod long_term;
pub mod persistence;
pub mod plan;
pub mod retrieval;
pub mod token_budget;

pub use assembler::{AssemblerSettings, Assembly, AssemblyRequest, ContextAssembler};
pub use chat_log::{ChatLog, ChatLogKind, ChatLogs, ChatMessage, SYSTEM_SENDER, USER_SENDER};
pub use code_ledger::{CodeLedger, CodeRecord};
pub use context::{ContextItem, ContextRegistry, ContextValue, SessionView};
pub use long_term::{InMemoryLongTerm, LongTermMemory, MemoryEntry, NoopLongTerm};
pub use persistence::ChatLogPersistence;
pub use plan::Plan;
pub use retrieval::{
    fit_snippets, largest_fitting_prefix, snippets_to_markup, InMemoryRetriever, NoopRetriever,
    Retriever, Snippet,
};
pub use token_budget::{CharCounter, TokenCounter, TokenEstimator};
