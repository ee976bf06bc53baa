//! LLM and embedder configuration
//!
//! Flat field bags with serde defaults, selected through backend-tagged
//! enums mirroring the `{"backend": ..., "config": ...}` wire shape used by
//! the service layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_temperature() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_version() -> String {
    "2024-03-01-preview".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

/// OpenAI chat-completion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiLlmConfig {
    pub model_name_or_path: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Explicit completion-token limit for model families that reject
    /// `max_tokens`; falls back to `max_tokens` when unset.
    #[serde(default)]
    pub max_completion_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Strip `<think>...</think>` blocks from responses.
    #[serde(default)]
    pub remove_think_prefix: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Extra top-level request fields forwarded to the vendor API.
    #[serde(default)]
    pub extra_body: Map<String, Value>,
}

/// Azure OpenAI chat-completion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureLlmConfig {
    pub model_name_or_path: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub remove_think_prefix: bool,
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

/// Universal OpenAI-compatible embedder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalApiEmbedderConfig {
    /// Provider tag: "openai" or "azure".
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model_name_or_path: String,
}

/// Backend-tagged LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", content = "config", rename_all = "lowercase")]
pub enum LlmConfig {
    Openai(OpenAiLlmConfig),
    Azure(AzureLlmConfig),
}

impl LlmConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            LlmConfig::Openai(_) => "openai",
            LlmConfig::Azure(_) => "azure",
        }
    }
}

/// Backend-tagged embedder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", content = "config", rename_all = "snake_case")]
pub enum EmbedderConfig {
    UniversalApi(UniversalApiEmbedderConfig),
}
