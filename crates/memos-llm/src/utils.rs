//! Shared helpers for LLM output post-processing

use once_cell::sync::Lazy;
use regex::Regex;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Strip `<think>...</think>` blocks from a response.
pub fn remove_thinking_tags(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim_start().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_think_block() {
        let text = "<think>reasoning here</think>\nThe answer is 42.";
        assert_eq!(remove_thinking_tags(text), "The answer is 42.");
    }

    #[test]
    fn test_removes_multiline_block() {
        let text = "<think>line one\nline two</think>result";
        assert_eq!(remove_thinking_tags(text), "result");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(remove_thinking_tags("no tags"), "no tags");
    }
}
