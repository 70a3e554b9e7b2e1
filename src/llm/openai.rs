//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 每次调用可指定模型，未指定时使用构造时的默认模型。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::ModelClient;

/// 累计 token 用量，可在多个会话间共享
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    inner: Arc<UsageCounters>,
}

#[derive(Debug, Default)]
struct UsageCounters {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, prompt: u64, completion: u64) {
        self.inner.prompt.fetch_add(prompt, Ordering::Relaxed);
        self.inner.completion.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn totals(&self) -> (u64, u64, u64) {
        let prompt = self.inner.prompt.load(Ordering::Relaxed);
        let completion = self.inner.completion.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    default_model: String,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            default_model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn build_messages(
        &self,
        prompt: &str,
        role_text: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let mut messages = Vec::with_capacity(2);
        if !role_text.is_empty() {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(role_text.to_string())
                    .build()
                    .map_err(|e| e.to_string())?,
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(|e| e.to_string())?,
        ));
        Ok(messages)
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn invoke(&self, prompt: &str, role_text: &str, model_id: &str) -> Result<String, String> {
        let model = if model_id.is_empty() {
            self.default_model.as_str()
        } else {
            model_id
        };
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(self.build_messages(prompt, role_text)?)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "model usage"
            );
            self.usage
                .record(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_is_shared_between_clones() {
        let usage = TokenUsage::new();
        let shared = usage.clone();
        shared.record(10, 5);
        shared.record(1, 1);
        assert_eq!(usage.totals(), (11, 6, 17));
    }

    #[test]
    fn test_system_message_skipped_without_role_text() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", Some("sk-test"));
        assert_eq!(client.build_messages("hi", "").unwrap().len(), 1);
        assert_eq!(client.build_messages("hi", "You are a Critic.").unwrap().len(), 2);
        assert_eq!(client.default_model(), "gpt-4o-mini");
    }
}
