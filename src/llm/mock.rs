//! Mock 模型客户端（用于本地运行与测试，无需 API）
//!
//! - MockModelClient：按角色说明给出固定形态的输出，评审总是通过，回复时回显最后一条用户消息
//! - ScriptedModelClient：按角色标记逐条返回预设回复（含失败），记录每次调用，供集成测试驱动状态机

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::ModelClient;

#[derive(Debug, Default)]
pub struct MockModelClient;

impl MockModelClient {
    fn last_user_message(prompt: &str) -> &str {
        let Some(start) = prompt.rfind("<message sender='User'>") else {
            return "(no input)";
        };
        let rest = &prompt[start..];
        let Some(open) = rest.find("<![CDATA[\n") else {
            return "(no input)";
        };
        let body = &rest[open + "<![CDATA[\n".len()..];
        body.find("\n]]>").map(|end| &body[..end]).unwrap_or(body)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(&self, prompt: &str, role_text: &str, _model_id: &str) -> Result<String, String> {
        let role = role_text.to_lowercase();
        let text = if role.contains("critic") {
            "The work looks complete. <Yes>".to_string()
        } else if role.contains("planning agent") {
            "<plan><step>Answer the request of the User</step></plan>".to_string()
        } else if role.contains("summarizing agent") {
            format!(
                "<response><![CDATA[Echo from Mock: {}]]></response>",
                Self::last_user_message(prompt)
            )
        } else {
            "<next_step/>".to_string()
        };
        Ok(text)
    }
}

/// 脚本化客户端的一次调用记录
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub marker: Option<String>,
    pub prompt: String,
    pub role_text: String,
    pub model_id: String,
}

struct Script {
    marker: String,
    replies: VecDeque<Result<String, String>>,
    last: Option<Result<String, String>>,
}

/// 按角色标记（角色说明中的子串，如 "Critic"）返回预设回复；回复用完后重复最后一条
#[derive(Default)]
pub struct ScriptedModelClient {
    scripts: Mutex<Vec<Script>>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script<I, S>(self, marker: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_results(marker, replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 可包含失败（Err）的脚本
    pub fn script_results<I>(self, marker: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Script {
                marker: marker.to_string(),
                replies: replies.into_iter().collect(),
                last: None,
            });
        self
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_for(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.marker.as_deref() == Some(marker))
            .count()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn invoke(&self, prompt: &str, role_text: &str, model_id: &str) -> Result<String, String> {
        let (marker, reply) = {
            let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
            match scripts.iter_mut().find(|s| role_text.contains(&s.marker)) {
                Some(script) => {
                    if let Some(next) = script.replies.pop_front() {
                        script.last = Some(next);
                    }
                    let reply = script
                        .last
                        .clone()
                        .unwrap_or_else(|| Err(format!("script for {} is empty", script.marker)));
                    (Some(script.marker.clone()), reply)
                }
                None => (None, Err("no script matches this role".to_string())),
            }
        };
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptedCall {
                marker,
                prompt: prompt.to_string(),
                role_text: role_text.to_string(),
                model_id: model_id.to_string(),
            });
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_sticks_to_last() {
        let client = ScriptedModelClient::new().script("Critic", ["<No>", "<Yes>"]);
        assert_eq!(client.invoke("p", "I am the Critic", "").await.unwrap(), "<No>");
        assert_eq!(client.invoke("p", "I am the Critic", "").await.unwrap(), "<Yes>");
        assert_eq!(client.invoke("p", "I am the Critic", "").await.unwrap(), "<Yes>");
        assert_eq!(client.calls_for("Critic"), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure_and_unknown_role() {
        let client = ScriptedModelClient::new()
            .script_results("Tinker", [Err("boom".to_string()), Ok("ok".to_string())]);
        assert_eq!(client.invoke("p", "Tinker Agent", "m").await, Err("boom".into()));
        assert_eq!(client.invoke("p", "Tinker Agent", "m").await, Ok("ok".into()));
        assert!(client.invoke("p", "Someone else", "m").await.is_err());
        assert_eq!(client.calls()[0].model_id, "m");
    }

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let prompt = "<chat>\n<message sender='User'>\n<![CDATA[\nhello there\n]]>\n</message>\n</chat>";
        let out = MockModelClient
            .invoke(prompt, "You are the Summarizing Agent.", "")
            .await
            .unwrap();
        assert_eq!(out, "<response><![CDATA[Echo from Mock: hello there]]></response>");
    }
}
