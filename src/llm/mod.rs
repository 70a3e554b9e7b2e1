//! LLM 层：模型客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本化测试替身）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, is_deepseek_model, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockModelClient, ScriptedCall, ScriptedModelClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::ModelClient;
