//! Token 计数
//!
//! 上下文装配与聊天记录截断都通过 TokenCounter 计量；实现必须无状态、可重入，
//! 以便多个会话并发共享同一个实例。

/// Token 计数器：给定文本与模型返回 token 数
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, model_id: &str) -> usize;
}

/// 启发式估算（简单的字符计数近似）
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// 英文约 4 字符/token，中文约 1.5 字符/token；非空文本至少 1
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

impl TokenCounter for TokenEstimator {
    fn count(&self, text: &str, _model_id: &str) -> usize {
        Self::estimate(text)
    }
}

/// 按字符计数，测试中便于精确控制预算
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCounter;

impl TokenCounter for CharCounter {
    fn count(&self, text: &str, _model_id: &str) -> usize {
        text.chars().count()
    }
}
