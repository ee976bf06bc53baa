//! Embedding client wrappers

mod universal_api;

pub use universal_api::*;

use async_trait::async_trait;
use memos_core::Result;
use std::sync::Arc;

use crate::config::EmbedderConfig;

/// Embedder trait
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed a batch of texts, one vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedder factory dispatching on the config backend tag
pub struct EmbedderFactory;

impl EmbedderFactory {
    pub fn from_config(config: EmbedderConfig) -> Result<Arc<dyn Embedder>> {
        match config {
            EmbedderConfig::UniversalApi(config) => {
                Ok(Arc::new(UniversalApiEmbedder::new(config)?))
            }
        }
    }
}
