//! OpenAI provider implementation (with streamed responses)
//!
//! Request shaping and fallback rules:
//! - `gpt-5*` models get a constrained parameter set (temperature pinned to
//!   1, sampling fields stripped, `max_completion_tokens` instead of
//!   `max_tokens`).
//! - A detected invalid-model error retries via the `/responses` endpoint for
//!   the gpt-5 family, then once more on `/chat/completions` with the
//!   `MOS_FALLBACK_MODEL` model. Any other error propagates unchanged.

use async_trait::async_trait;
use futures::stream;
use memos_core::{MemosError, Message, Result};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::OpenAiLlmConfig;
use crate::fallback::{fallback_chat_model, is_model_not_found};
use crate::providers::LlmProvider;
use crate::stream::{TextStream, bracket_reasoning, parse_sse_stream};
use crate::utils::remove_thinking_tags;

/// Extra-body keys the gpt-5 family rejects.
const GPT5_STRIPPED_FIELDS: [&str; 4] = ["top_p", "top_logprobs", "logprobs", "logit_bias"];

fn is_gpt5_family(model: &str) -> bool {
    model.starts_with("gpt-5")
}

/// Build a chat-completion request body for the given model.
fn build_chat_body(
    config: &OpenAiLlmConfig,
    model: &str,
    messages: &[Message],
    stream: bool,
) -> Value {
    let mut body = config.extra_body.clone();

    let rendered: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    body.insert("model".to_string(), json!(model));
    body.insert("messages".to_string(), json!(rendered));
    if stream {
        body.insert("stream".to_string(), json!(true));
    }

    if is_gpt5_family(model) {
        // API constraint: no sampling/logprob fields, temperature must be 1.
        for key in GPT5_STRIPPED_FIELDS {
            body.remove(key);
        }
        body.insert("temperature".to_string(), json!(1));
        let max_completion = config.max_completion_tokens.unwrap_or(config.max_tokens);
        body.insert("max_completion_tokens".to_string(), json!(max_completion));
    } else {
        body.insert("temperature".to_string(), json!(config.temperature));
        body.insert("max_tokens".to_string(), json!(config.max_tokens));
        // Streaming requests do not carry a sampling override.
        if !stream && let Some(top_p) = config.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
    }

    Value::Object(body)
}

/// Build the retry body for the fallback model (never gpt-5 shaped).
fn build_fallback_body(
    config: &OpenAiLlmConfig,
    fallback_model: &str,
    messages: &[Message],
    stream: bool,
) -> Value {
    let mut body = config.extra_body.clone();

    let rendered: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    body.insert("model".to_string(), json!(fallback_model));
    body.insert("messages".to_string(), json!(rendered));
    if stream {
        body.insert("stream".to_string(), json!(true));
    }
    body.insert("temperature".to_string(), json!(config.temperature));
    body.insert("max_tokens".to_string(), json!(config.max_tokens));

    Value::Object(body)
}

/// OpenAI provider
pub struct OpenAiLlm {
    config: OpenAiLlmConfig,
    client: reqwest::Client,
}

impl OpenAiLlm {
    pub fn new(mut config: OpenAiLlmConfig) -> Self {
        // Sanitize the model name once; everything downstream relies on it.
        config.model_name_or_path = config.model_name_or_path.trim().to_string();
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn base_url(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    fn model(&self) -> &str {
        &self.config.model_name_or_path
    }

    /// POST a JSON body. Outer `Err` is a transport failure; the inner
    /// `Err(String)` carries the API error body for classification.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<std::result::Result<Value, String>> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| MemosError::Http(format!("OpenAI API request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Ok(Err(error_text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| MemosError::LlmProvider(format!("failed to parse response: {}", e)))?;
        Ok(Ok(json))
    }

    /// Send a streaming request, returning the raw response on success and
    /// the API error body on a non-success status.
    async fn send_stream_request(
        &self,
        body: &Value,
    ) -> Result<std::result::Result<reqwest::Response, String>> {
        let url = format!("{}/chat/completions", self.base_url());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| MemosError::Http(format!("OpenAI stream API request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Ok(Err(error_text));
        }

        Ok(Ok(response))
    }

    /// Retry a gpt-5 family request through the `/responses` endpoint.
    async fn try_responses_endpoint(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/responses", self.base_url());
        let input = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let max_output = self
            .config
            .max_completion_tokens
            .unwrap_or(self.config.max_tokens);
        let body = json!({
            "model": self.model(),
            "input": input,
            "max_output_tokens": max_output,
        });

        match self.post_json(&url, &body).await? {
            Ok(json) => {
                let content = json["output_text"]
                    .as_str()
                    .or_else(|| json["output"][0]["content"][0]["text"].as_str())
                    .unwrap_or("")
                    .to_string();
                Ok(content)
            }
            Err(error_text) => Err(MemosError::LlmProvider(error_text)),
        }
    }

    fn finish(&self, content: String) -> String {
        if self.config.remove_think_prefix {
            remove_thinking_tags(&content)
        } else {
            content
        }
    }

    fn extract_content(json: &Value) -> String {
        json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string()
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlm {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url());
        let body = build_chat_body(&self.config, self.model(), messages, false);

        let response = match self.post_json(&url, &body).await? {
            Ok(json) => json,
            Err(error_text) => {
                if !is_model_not_found(&error_text) {
                    return Err(MemosError::LlmProvider(error_text));
                }

                if is_gpt5_family(self.model()) {
                    match self.try_responses_endpoint(messages).await {
                        Ok(content) => return Ok(self.finish(content)),
                        Err(e) => {
                            warn!(
                                "responses API fallback failed for '{}': {}",
                                self.model(),
                                e
                            );
                        }
                    }
                }

                let fallback_model = fallback_chat_model();
                warn!(
                    "model '{}' not available, falling back to '{}': {}",
                    self.model(),
                    fallback_model,
                    error_text
                );
                let fallback_body =
                    build_fallback_body(&self.config, &fallback_model, messages, false);
                match self.post_json(&url, &fallback_body).await? {
                    Ok(json) => json,
                    Err(error_text) => return Err(MemosError::LlmProvider(error_text)),
                }
            }
        };

        debug!("response from OpenAI: {}", response);
        Ok(self.finish(Self::extract_content(&response)))
    }

    async fn generate_stream(&self, messages: &[Message]) -> Result<TextStream> {
        let body = build_chat_body(&self.config, self.model(), messages, true);

        let response = match self.send_stream_request(&body).await? {
            Ok(response) => response,
            Err(error_text) => {
                if !is_model_not_found(&error_text) {
                    return Err(MemosError::LlmProvider(error_text));
                }

                if is_gpt5_family(self.model()) {
                    match self.try_responses_endpoint(messages).await {
                        Ok(content) if !content.is_empty() => {
                            // Non-stream fallback: emit once.
                            let content = self.finish(content);
                            return Ok(Box::pin(stream::iter(vec![Ok(content)])));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                "responses API streaming fallback failed for '{}': {}",
                                self.model(),
                                e
                            );
                        }
                    }
                }

                let fallback_model = fallback_chat_model();
                warn!(
                    "model '{}' not available for streaming, falling back to '{}': {}",
                    self.model(),
                    fallback_model,
                    error_text
                );
                let fallback_body =
                    build_fallback_body(&self.config, &fallback_model, messages, true);
                match self.send_stream_request(&fallback_body).await? {
                    Ok(response) => response,
                    Err(error_text) => return Err(MemosError::LlmProvider(error_text)),
                }
            }
        };

        let deltas = parse_sse_stream(response);
        Ok(Box::pin(bracket_reasoning(
            deltas,
            !self.config.remove_think_prefix,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> OpenAiLlmConfig {
        serde_json::from_value(json!({
            "model_name_or_path": model,
            "api_key": "sk-test",
            "top_p": 0.9,
            "extra_body": {"logit_bias": {"50256": -100}, "seed": 7},
        }))
        .unwrap()
    }

    fn messages() -> Vec<Message> {
        vec![Message::user("hello")]
    }

    #[test]
    fn test_gpt5_request_shape() {
        let config = config("gpt-5-preview");
        let body = build_chat_body(&config, "gpt-5-preview", &messages(), false);

        assert_eq!(body["temperature"], json!(1));
        assert!(body.get("top_p").is_none());
        assert!(body.get("logit_bias").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], json!(1024));
        // Unrelated extra_body fields survive.
        assert_eq!(body["seed"], json!(7));
    }

    #[test]
    fn test_gpt5_explicit_completion_limit() {
        let mut config = config("gpt-5");
        config.max_completion_tokens = Some(256);
        let body = build_chat_body(&config, "gpt-5", &messages(), false);
        assert_eq!(body["max_completion_tokens"], json!(256));
    }

    #[test]
    fn test_standard_request_shape() {
        let config = config("gpt-4o-mini");
        let body = build_chat_body(&config, "gpt-4o-mini", &messages(), false);

        assert!((body["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(body["max_tokens"], json!(1024));
        assert!((body["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!(body.get("max_completion_tokens").is_none());
        assert_eq!(body["logit_bias"]["50256"], json!(-100));
    }

    #[test]
    fn test_stream_flag() {
        let config = config("gpt-4o-mini");
        let body = build_chat_body(&config, "gpt-4o-mini", &messages(), true);
        assert_eq!(body["stream"], json!(true));
        let body = build_chat_body(&config, "gpt-4o-mini", &messages(), false);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_streaming_request_omits_top_p() {
        let config = config("gpt-4o-mini");
        let body = build_chat_body(&config, "gpt-4o-mini", &messages(), true);
        assert!(body.get("top_p").is_none());
        let body = build_chat_body(&config, "gpt-4o-mini", &messages(), false);
        assert!((body["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_body_never_gpt5_shaped() {
        let config = config("gpt-5-preview");
        let body = build_fallback_body(&config, "gpt-4o-mini", &messages(), false);
        assert_eq!(body["model"], json!("gpt-4o-mini"));
        assert_eq!(body["max_tokens"], json!(1024));
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_model_name_sanitized() {
        let provider = OpenAiLlm::new(config("  gpt-5-preview  "));
        assert_eq!(provider.model(), "gpt-5-preview");
        assert!(is_gpt5_family(provider.model()));
    }

    #[test]
    fn test_message_rendering() {
        let config = config("gpt-4o-mini");
        let body = build_chat_body(&config, "gpt-4o-mini", &messages(), false);
        assert_eq!(body["messages"][0]["role"], json!("user"));
        assert_eq!(body["messages"][0]["content"], json!("hello"));
    }

    #[test]
    fn test_extract_content() {
        let json = json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(OpenAiLlm::extract_content(&json), "hi");
        assert_eq!(OpenAiLlm::extract_content(&json!({})), "");
    }

    use crate::test_support::canned_server;

    const MODEL_NOT_FOUND_BODY: &str =
        r#"{"error":{"code":"model_not_found","message":"the model does not exist"}}"#;

    fn provider_at(base_url: String, model: &str) -> OpenAiLlm {
        let mut config = config(model);
        config.api_base = base_url;
        OpenAiLlm::new(config)
    }

    #[tokio::test]
    async fn test_invalid_model_retries_once_with_fallback_model() {
        let _guard = crate::fallback::ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var("MOS_FALLBACK_MODEL") };

        let completion = r#"{"choices":[{"message":{"content":"fallback answer"}}]}"#;
        let (base_url, requests) = canned_server(vec![
            (404, MODEL_NOT_FOUND_BODY.to_string()),
            (200, completion.to_string()),
        ])
        .await;
        let provider = provider_at(base_url, "gpt-9-experimental");

        let content = provider.generate(&messages()).await.unwrap();
        assert_eq!(content, "fallback answer");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "/chat/completions");
        assert_eq!(requests[0].body["model"], json!("gpt-9-experimental"));
        assert_eq!(requests[1].path, "/chat/completions");
        assert_eq!(requests[1].body["model"], json!("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_unmatched_error_propagates_without_retry() {
        let body = r#"{"error":{"code":"rate_limit_exceeded","message":"slow down"}}"#;
        let (base_url, requests) = canned_server(vec![(429, body.to_string())]).await;
        let provider = provider_at(base_url, "gpt-4o-mini");

        assert!(provider.generate(&messages()).await.is_err());
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gpt5_tries_responses_endpoint_before_model_fallback() {
        let responses_ok = r#"{"output_text":"responses answer"}"#;
        let (base_url, requests) = canned_server(vec![
            (404, MODEL_NOT_FOUND_BODY.to_string()),
            (200, responses_ok.to_string()),
        ])
        .await;
        let provider = provider_at(base_url, "gpt-5-preview");

        let content = provider.generate(&messages()).await.unwrap();
        assert_eq!(content, "responses answer");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "/chat/completions");
        assert_eq!(requests[1].path, "/responses");
        assert_eq!(requests[1].body["model"], json!("gpt-5-preview"));
    }
}
