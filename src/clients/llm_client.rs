//! LLM API 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - Gemini 与 Perplexity 都提供 OpenAI 兼容端点，共用同一个实现

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::AiError;
use crate::services::ai_provider::CompletionBackend;

/// OpenAI 兼容的补全服务
pub struct LlmClient {
    name: String,
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(
        name: impl Into<String>,
        api_key: &str,
        api_base: &str,
        model_name: impl Into<String>,
    ) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            name: name.into(),
            client: Client::with_config(openai_config),
            model_name: model_name.into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    fn request_failed(&self, message: impl ToString) -> AiError {
        AiError::Request {
            provider: self.name.clone(),
            message: message.to_string(),
        }
    }
}

/// 根据错误信息判断是否为配额 / 频率限制错误
pub fn classify_failure(provider: &str, message: String) -> AiError {
    let lowered = message.to_lowercase();
    let is_quota = lowered.contains("429")
        || lowered.contains("quota")
        || lowered.contains("rate limit")
        || lowered.contains("resource_exhausted");

    if is_quota {
        AiError::QuotaExceeded {
            provider: provider.to_string(),
            message,
        }
    } else {
        AiError::Request {
            provider: provider.to_string(),
            message,
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        debug!("调用 {} API，模型: {}", self.name, self.model_name);
        debug!("提示词长度: {} 字符", prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| self.request_failed(e))?;
        let messages = vec![ChatCompletionRequestMessage::User(user_msg)];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| self.request_failed(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("{} API 调用失败: {}", self.name, e);
            classify_failure(&self.name, e.to_string())
        })?;

        debug!("{} API 调用成功", self.name);

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AiError::EmptyResponse {
                provider: self.name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure_detects_quota() {
        let err = classify_failure("gemini", "HTTP 429 Too Many Requests".to_string());
        assert!(err.is_quota());

        let err = classify_failure("gemini", "You exceeded your current quota".to_string());
        assert!(err.is_quota());

        let err = classify_failure("gemini", "invalid api key".to_string());
        assert!(!err.is_quota());
    }

    /// 测试真实 API 连通性
    #[tokio::test]
    #[ignore]
    async fn test_complete_against_live_api() {
        let _ = tracing_subscriber::fmt::try_init();
        let key = std::env::var("GEMINI_API_KEY").expect("需要 GEMINI_API_KEY");
        let client = LlmClient::new(
            "gemini",
            &key,
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.0-flash",
        );

        let response = client.complete("用一句话介绍你自己").await.unwrap();
        println!("LLM 响应: {}", response);
        assert!(!response.is_empty());
    }
}
