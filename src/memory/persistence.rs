//! 聊天记录持久化
//!
//! 将聊天记录写入/从 JSON 文件加载，用于跨进程恢复会话（可选使用）。

use std::path::{Path, PathBuf};

use crate::memory::ChatMessage;

/// 简单的文件持久化：单文件 JSON，每条消息含 sender + text + timestamp
#[derive(Debug, Clone)]
pub struct ChatLogPersistence {
    path: PathBuf,
}

impl ChatLogPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 从 JSON 文件加载；文件不存在时返回空 Vec
    pub fn load(&self) -> anyhow::Result<Vec<ChatMessage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 写入 JSON 文件；父目录不存在时自动创建
    pub fn save(&self, messages: &[ChatMessage]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(messages)?)?;
        Ok(())
    }
}
