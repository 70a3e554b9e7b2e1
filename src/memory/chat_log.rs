//! 聊天记录
//!
//! 每个会话维护三份记录：
//! - **user**：用户可见（用户消息、回复、系统提示）
//! - **history**：思考过程（角色输出与命令结果）
//! - **transcript**：history 加上完整提示词
//!
//! tail_as_markup 从最新消息向前渲染，直到达到 token 上限，其余以一条省略标记代替。

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::command::markup::escape_attribute;
use crate::memory::{ChatLogPersistence, TokenCounter};

pub const SYSTEM_SENDER: &str = "System";
pub const USER_SENDER: &str = "User";

/// 尾部渲染为上限预留的余量
const TAIL_RESERVE_TOKENS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    fn to_markup(&self) -> String {
        format!(
            "<message sender='{}'>\n<![CDATA[\n{}\n]]>\n</message>",
            escape_attribute(&self.sender),
            escape_cdata(&self.text)
        )
    }
}

/// CDATA 内不能出现 `]]>`，拆成两段
fn escape_cdata(text: &str) -> String {
    text.replace("]]>", "]]]]><![CDATA[>")
}

/// 三份记录的标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatLogKind {
    User,
    History,
    Transcript,
}

impl ChatLogKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ChatLogKind::User => "user_chat.json",
            ChatLogKind::History => "history_chat.json",
            ChatLogKind::Transcript => "transcript_chat.json",
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    persistence: Option<ChatLogPersistence>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定持久化文件并加载已有消息；加载失败时记录警告并从空记录开始
    pub fn with_persistence(persistence: ChatLogPersistence) -> Self {
        let messages = persistence.load().unwrap_or_else(|e| {
            tracing::warn!(path = %persistence.path().display(), "chat log load failed: {}", e);
            Vec::new()
        });
        Self {
            messages,
            persistence: Some(persistence),
        }
    }

    pub fn append(&mut self, sender: impl Into<String>, text: impl Into<String>) {
        self.messages.push(ChatMessage::new(sender, text));
        if let Some(p) = &self.persistence {
            if let Err(e) = p.save(&self.messages) {
                tracing::warn!(path = %p.path().display(), "chat log save failed: {}", e);
            }
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn last_sender(&self) -> Option<&str> {
        self.messages.last().map(|m| m.sender.as_str())
    }

    /// 末尾连续的某发送者消息（跳过夹在其中的 System 消息），按时间顺序以换行拼接
    pub fn last_messages_of_sender(&self, sender: &str) -> String {
        let mut collected: Vec<&str> = Vec::new();
        for msg in self.messages.iter().rev() {
            if msg.sender == sender {
                collected.push(&msg.text);
            } else if msg.sender == SYSTEM_SENDER {
                continue;
            } else {
                break;
            }
        }
        collected.reverse();
        collected.join("\n")
    }

    /// 渲染最近的消息为 `<chat>` 标记，总量不超过 `max_tokens - 100`
    pub fn tail_as_markup(&self, max_tokens: usize, counter: &dyn TokenCounter, model_id: &str) -> String {
        let budget = max_tokens.saturating_sub(TAIL_RESERVE_TOKENS);
        let mut parts: Vec<String> = Vec::new();
        let mut used = 0;

        for msg in self.messages.iter().rev() {
            let rendered = msg.to_markup();
            let cost = counter.count(&rendered, model_id);
            if used + cost > budget {
                break;
            }
            used += cost;
            parts.push(rendered);
        }

        let omitted = self.messages.len() - parts.len();
        parts.reverse();
        if omitted > 0 {
            parts.insert(
                0,
                format!("<message sender='{SYSTEM_SENDER}'>Omitted {omitted} messages</message>"),
            );
        }
        format!("<chat>\n{}\n</chat>", parts.join("\n"))
    }
}

/// 会话的三份聊天记录
#[derive(Debug, Default)]
pub struct ChatLogs {
    pub user: ChatLog,
    pub history: ChatLog,
    pub transcript: ChatLog,
}

impl ChatLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在目录下为三份记录分别绑定 JSON 文件
    pub fn persistent(dir: &std::path::Path) -> Self {
        let open = |kind: ChatLogKind| {
            ChatLog::with_persistence(ChatLogPersistence::new(dir.join(kind.file_name())))
        };
        Self {
            user: open(ChatLogKind::User),
            history: open(ChatLogKind::History),
            transcript: open(ChatLogKind::Transcript),
        }
    }

    pub fn get(&self, kind: ChatLogKind) -> &ChatLog {
        match kind {
            ChatLogKind::User => &self.user,
            ChatLogKind::History => &self.history,
            ChatLogKind::Transcript => &self.transcript,
        }
    }

    /// 写入全部三份记录（用户消息、回复、警告）
    pub fn append_all(&mut self, sender: &str, text: &str) {
        self.user.append(sender, text);
        self.history.append(sender, text);
        self.transcript.append(sender, text);
    }

    /// 写入 history 与 transcript（用户不可见的思考过程）
    pub fn append_internal(&mut self, sender: &str, text: &str) {
        self.history.append(sender, text);
        self.transcript.append(sender, text);
    }
}
