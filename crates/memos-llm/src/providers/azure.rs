//! Azure OpenAI provider implementation

use async_trait::async_trait;
use memos_core::{MemosError, Message, Result};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::AzureLlmConfig;
use crate::providers::LlmProvider;
use crate::stream::TextStream;
use crate::utils::remove_thinking_tags;

/// Azure OpenAI provider
pub struct AzureLlm {
    config: AzureLlmConfig,
    client: reqwest::Client,
}

impl AzureLlm {
    pub fn new(config: AzureLlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Deployment-scoped chat-completion URL with the api-version query.
    fn chat_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model_name_or_path,
            self.config.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureLlm {
    fn name(&self) -> &str {
        "azure"
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let rendered: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "messages": rendered,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        if let Some(top_p) = self.config.top_p {
            body["top_p"] = json!(top_p);
        }

        let response = self
            .client
            .post(self.chat_url())
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MemosError::Http(format!("Azure OpenAI API request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MemosError::LlmProvider(format!(
                "Azure OpenAI API error: {}",
                error_text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| MemosError::LlmProvider(format!("failed to parse response: {}", e)))?;

        debug!("response from Azure OpenAI: {}", json);
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        if self.config.remove_think_prefix {
            Ok(remove_thinking_tags(&content))
        } else {
            Ok(content)
        }
    }

    async fn generate_stream(&self, _messages: &[Message]) -> Result<TextStream> {
        Err(MemosError::LlmProvider(
            "streaming is not supported for the azure backend".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_construction() {
        let config: AzureLlmConfig = serde_json::from_value(json!({
            "model_name_or_path": "gpt-4o",
            "base_url": "https://example.openai.azure.com/",
            "api_key": "azure-key",
        }))
        .unwrap();
        let provider = AzureLlm::new(config);
        assert_eq!(
            provider.chat_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-03-01-preview"
        );
    }

    #[tokio::test]
    async fn test_streaming_unsupported() {
        let config: AzureLlmConfig = serde_json::from_value(json!({
            "model_name_or_path": "gpt-4o",
            "base_url": "https://example.openai.azure.com",
        }))
        .unwrap();
        let provider = AzureLlm::new(config);
        let result = provider.generate_stream(&[Message::user("hi")]).await;
        assert!(result.is_err());
    }
}
