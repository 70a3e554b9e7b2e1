//! DeepSeek 后端：OpenAI 兼容端点的预设
//!
//! deepseek-chat 适合执行与回复角色；deepseek-reasoner 输出更长，适合作为规划或评审角色的模型。

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 模型名是否属于 DeepSeek
pub fn is_deepseek_model(model_id: &str) -> bool {
    model_id.starts_with("deepseek-")
}

/// 按 [llm] 段创建 DeepSeek 客户端
///
/// 密钥取 `DEEPSEEK_API_KEY`，缺失时退回 `OPENAI_API_KEY`；配置里的 base_url 优先于官方地址。
/// 配置的模型不是 DeepSeek 模型时改用 deepseek-chat。
pub fn create_deepseek_client(llm: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();
    let model = if is_deepseek_model(&llm.model) {
        llm.model.as_str()
    } else {
        tracing::warn!(model = %llm.model, "not a DeepSeek model, using {}", DEEPSEEK_CHAT);
        DEEPSEEK_CHAT
    };
    let base_url = llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
    OpenAiClient::new(Some(base_url), model, api_key.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_family() {
        assert!(is_deepseek_model(DEEPSEEK_REASONER));
        assert!(!is_deepseek_model("gpt-4o-mini"));
    }

    #[test]
    fn test_non_deepseek_model_falls_back_to_chat() {
        let llm = LlmSection {
            provider: "deepseek".into(),
            model: "gpt-4o-mini".into(),
            base_url: None,
            critic_model: None,
        };
        let client = create_deepseek_client(&llm);
        assert_eq!(client.default_model(), DEEPSEEK_CHAT);
    }
}
