//! MemOS LLM - OpenAI-compatible chat and embedding client wrappers
//!
//! Thin glue around vendor HTTP APIs: request shaping for constrained model
//! families, invalid-model fallback, and streamed token re-emission with
//! think-tag bracketing.

pub mod config;
pub mod embedders;
pub mod fallback;
pub mod providers;
pub mod stream;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use embedders::*;
pub use fallback::*;
pub use providers::*;
pub use stream::{StreamDelta, TextStream, bracket_reasoning};
pub use utils::remove_thinking_tags;
