//! 模型客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 ModelClient：给定提示词、角色说明与模型 id，返回生成文本。
//! 失败以字符串返回，由编排层替换为固定的失败提示并计入迭代次数。

use async_trait::async_trait;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// `role_text` 作为 system 消息，`prompt` 作为 user 消息；`model_id` 为空时使用客户端默认模型
    async fn invoke(&self, prompt: &str, role_text: &str, model_id: &str) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
