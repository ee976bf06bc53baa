//! LLM provider implementations

mod azure;
mod openai;

pub use azure::*;
pub use openai::*;

use async_trait::async_trait;
use memos_core::{Message, Result};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::stream::TextStream;

/// LLM provider trait
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider backend name
    fn name(&self) -> &str;

    /// Generate a complete response.
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Generate a streamed response as lazily-pulled text chunks.
    async fn generate_stream(&self, messages: &[Message]) -> Result<TextStream>;
}

/// Provider factory dispatching on the config backend tag
pub struct LlmFactory;

impl LlmFactory {
    pub fn from_config(config: LlmConfig) -> Result<Arc<dyn LlmProvider>> {
        match config {
            LlmConfig::Openai(config) => Ok(Arc::new(OpenAiLlm::new(config))),
            LlmConfig::Azure(config) => Ok(Arc::new(AzureLlm::new(config))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenAiLlmConfig;

    #[test]
    fn test_factory_dispatch() {
        let config: OpenAiLlmConfig = serde_json::from_value(serde_json::json!({
            "model_name_or_path": "gpt-4o-mini",
            "api_key": "sk-test",
        }))
        .unwrap();

        let provider = LlmFactory::from_config(LlmConfig::Openai(config)).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
