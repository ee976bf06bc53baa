//! OpenAI-compatible embedding wrapper for OpenAI and Azure endpoints

use async_trait::async_trait;
use memos_core::{MemosError, Result};
use serde_json::{Value, json};
use tracing::warn;

use crate::config::UniversalApiEmbedderConfig;
use crate::embedders::Embedder;
use crate::fallback::{fallback_embedding_model, is_model_not_found};

/// Provider family behind the universal embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Azure,
}

impl EmbeddingProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "azure" => Some(Self::Azure),
            _ => None,
        }
    }
}

/// Universal OpenAI-compatible embedder
pub struct UniversalApiEmbedder {
    provider: EmbeddingProvider,
    config: UniversalApiEmbedderConfig,
    client: reqwest::Client,
}

impl UniversalApiEmbedder {
    pub fn new(config: UniversalApiEmbedderConfig) -> Result<Self> {
        let provider = EmbeddingProvider::from_str(&config.provider).ok_or_else(|| {
            MemosError::Config(format!("unsupported embedding provider: {}", config.provider))
        })?;

        Ok(Self {
            provider,
            config,
            client: reqwest::Client::new(),
        })
    }

    fn embeddings_url(&self, model: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.provider {
            EmbeddingProvider::OpenAi => format!("{}/embeddings", base),
            // Azure scopes the endpoint by deployment, so the model is part
            // of the URL rather than the body.
            EmbeddingProvider::Azure => format!(
                "{}/openai/deployments/{}/embeddings?api-version=2024-03-01-preview",
                base, model
            ),
        }
    }

    /// One embeddings call. The inner `Err(String)` carries the API error
    /// body for classification.
    async fn request_embeddings(
        &self,
        model: &str,
        texts: &[String],
    ) -> Result<std::result::Result<Vec<Vec<f32>>, String>> {
        let body = json!({"model": model, "input": texts});

        let request = self.client.post(self.embeddings_url(model));
        let request = match self.provider {
            EmbeddingProvider::OpenAi => request.bearer_auth(&self.config.api_key),
            EmbeddingProvider::Azure => request.header("api-key", &self.config.api_key),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| MemosError::Http(format!("embedding API request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Ok(Err(error_text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| MemosError::Embedder(format!("failed to parse response: {}", e)))?;

        let embeddings: Vec<Vec<f32>> = json["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| item["embedding"].as_array())
                    .map(|emb| {
                        emb.iter()
                            .filter_map(|v| v.as_f64())
                            .map(|v| v as f32)
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Ok(embeddings))
    }
}

#[async_trait]
impl Embedder for UniversalApiEmbedder {
    fn name(&self) -> &str {
        "universal_api"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.config.model_name_or_path.trim();

        match self.request_embeddings(model, texts).await? {
            Ok(embeddings) => Ok(embeddings),
            Err(error_text) => {
                if !is_model_not_found(&error_text) {
                    return Err(MemosError::Embedder(error_text));
                }

                let fallback_model = fallback_embedding_model();
                warn!(
                    "embedding model '{}' not available, falling back to '{}': {}",
                    model, fallback_model, error_text
                );
                match self.request_embeddings(&fallback_model, texts).await? {
                    Ok(embeddings) => Ok(embeddings),
                    Err(error_text) => Err(MemosError::Embedder(error_text)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> UniversalApiEmbedderConfig {
        serde_json::from_value(json!({
            "provider": provider,
            "api_key": "sk-test",
            "base_url": "https://example.com/v1",
        }))
        .unwrap()
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        assert!(UniversalApiEmbedder::new(config("cohere")).is_err());
    }

    #[test]
    fn test_openai_url() {
        let embedder = UniversalApiEmbedder::new(config("openai")).unwrap();
        assert_eq!(
            embedder.embeddings_url("text-embedding-3-large"),
            "https://example.com/v1/embeddings"
        );
    }

    #[test]
    fn test_azure_url_includes_deployment() {
        let embedder = UniversalApiEmbedder::new(config("azure")).unwrap();
        assert_eq!(
            embedder.embeddings_url("text-embedding-3-large"),
            "https://example.com/v1/openai/deployments/text-embedding-3-large/embeddings?api-version=2024-03-01-preview"
        );
    }

    #[test]
    fn test_provider_tag_case_insensitive() {
        assert_eq!(
            EmbeddingProvider::from_str("OpenAI"),
            Some(EmbeddingProvider::OpenAi)
        );
        assert_eq!(
            EmbeddingProvider::from_str("azure"),
            Some(EmbeddingProvider::Azure)
        );
        assert_eq!(EmbeddingProvider::from_str("vertex"), None);
    }

    use crate::test_support::canned_server;

    const MODEL_NOT_FOUND_BODY: &str =
        r#"{"error":{"code":"model_not_found","message":"no such model"}}"#;

    fn embedder_at(base_url: String, model: &str) -> UniversalApiEmbedder {
        let mut config = config("openai");
        config.base_url = base_url;
        config.model_name_or_path = model.to_string();
        UniversalApiEmbedder::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_model_retries_with_fallback_model() {
        let _guard = crate::fallback::ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var("MOS_EMBED_FALLBACK_MODEL") };

        let embeddings = r#"{"data":[{"embedding":[0.5,1.5]}]}"#;
        let (base_url, requests) = canned_server(vec![
            (404, MODEL_NOT_FOUND_BODY.to_string()),
            (200, embeddings.to_string()),
        ])
        .await;
        let embedder = embedder_at(base_url, "text-embedding-9");

        let vectors = embedder.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.5, 1.5]]);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body["model"], json!("text-embedding-9"));
        assert_eq!(requests[1].body["model"], json!("text-embedding-3-large"));
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates_after_single_retry() {
        let _guard = crate::fallback::ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var("MOS_EMBED_FALLBACK_MODEL") };

        let (base_url, requests) = canned_server(vec![
            (404, MODEL_NOT_FOUND_BODY.to_string()),
            (404, MODEL_NOT_FOUND_BODY.to_string()),
        ])
        .await;
        let embedder = embedder_at(base_url, "text-embedding-9");

        assert!(embedder.embed(&["hello".to_string()]).await.is_err());
        assert_eq!(requests.lock().unwrap().len(), 2);
    }
}
