//! 沙箱文件系统与文档工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! DocumentTool 基于 SafeFs 处理 `<document filepath="..."/>`，只读取纯文本文档。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::core::AgentError;
use crate::tools::{Tool, ToolRequest};

/// 列出的文档目录
const DOCUMENT_DIRS: [&str; 2] = ["uploads", "output"];

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 检查路径是否在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim_start_matches("./");
        let canonical = self
            .root_dir
            .join(path)
            .canonicalize()
            .map_err(|_| AgentError::ToolExecution(format!("Path not found: {path}")))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecution(format!("Read failed: {e}")))
    }

    /// uploads/ 与 output/ 下的所有文件（相对根目录，`/` 分隔，已排序）
    pub fn document_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = DOCUMENT_DIRS
            .iter()
            .map(|dir| self.root_dir.join(dir))
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .collect::<Vec<_>>()
            })
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root_dir)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        paths.sort();
        paths
    }
}

/// 文档工具：读取工作区内的文本文档，超过上限时截断
pub struct DocumentTool {
    fs: SafeFs,
    max_chars: usize,
}

impl DocumentTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
            max_chars: 20_000,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl Tool for DocumentTool {
    fn name(&self) -> &str {
        "document"
    }

    fn description(&self) -> &str {
        "Read a project document. Attribute: filepath (relative to the workspace)"
    }

    async fn execute(&self, request: ToolRequest) -> Result<String, String> {
        let Some(path) = request.command.attr_str("filepath") else {
            return Err("Document could not be retrieved. Filepath not provided.".to_string());
        };
        tracing::info!(path = %path, "document tool execute");
        let content = self.fs.read_file(&path).map_err(|e| e.to_string())?;
        let total = content.chars().count();
        if total > self.max_chars {
            let truncated: String = content.chars().take(self.max_chars).collect();
            Ok(format!(
                "{truncated}\n\n[... Content truncated: {} of {total} characters shown ...]",
                self.max_chars
            ))
        } else {
            Ok(content)
        }
    }
}
