//! Unified error handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemosError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("embedder error: {0}")]
    Embedder(String),

    #[error("user manager error: {0}")]
    UserManager(String),

    #[error("HTTP request error: {0}")]
    Http(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemosError>;
