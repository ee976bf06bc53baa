//! Invalid-model error classification and fallback model selection
//!
//! Vendor errors are classified by the structured `error.code` field when the
//! body parses as JSON, with a lowercased substring match on the raw body as
//! a last resort for providers that return plain text.

use serde_json::Value;

pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBED_FALLBACK_MODEL: &str = "text-embedding-3-large";

/// Whether an API error body indicates the requested model does not exist.
pub fn is_model_not_found(error_body: &str) -> bool {
    if let Ok(json) = serde_json::from_str::<Value>(error_body)
        && let Some(code) = json["error"]["code"].as_str()
        && matches!(code, "model_not_found" | "invalid_model")
    {
        return true;
    }

    let msg = error_body.to_lowercase();
    msg.contains("invalid model") || msg.contains("model_not_found")
}

fn env_model(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Fallback chat model from `MOS_FALLBACK_MODEL`.
pub fn fallback_chat_model() -> String {
    env_model("MOS_FALLBACK_MODEL", DEFAULT_FALLBACK_MODEL)
}

/// Fallback embedding model from `MOS_EMBED_FALLBACK_MODEL`.
pub fn fallback_embedding_model() -> String {
    env_model("MOS_EMBED_FALLBACK_MODEL", DEFAULT_EMBED_FALLBACK_MODEL)
}

// Fallback-model env vars are process-wide; tests that read or set them
// serialize on this lock.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
