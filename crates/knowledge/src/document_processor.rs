//! Text preparation applied before anything is embedded or stored.

use rizz_common::{Result, RizzError};
use tiktoken_rs::CoreBPE;

/// Upper bound the OpenAI embedding endpoints accept per input.
pub const MAX_EMBEDDING_TOKENS: usize = 8191;

/// Collapses runs of whitespace (including newlines) into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` down to at most `max_tokens` tokens of the given encoding.
pub fn truncate_to_tokens(bpe: &CoreBPE, text: &str, max_tokens: usize) -> Result<String> {
    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= max_tokens {
        return Ok(text.to_string());
    }

    tracing::debug!(
        "Truncating embedding input from {} to {} tokens",
        tokens.len(),
        max_tokens
    );

    // A cut can land inside a multi-byte character; back off until the prefix is valid UTF-8.
    let mut last_error = None;
    for end in (0..=max_tokens).rev() {
        match bpe.decode(tokens[..end].to_vec()) {
            Ok(prefix) => return Ok(prefix),
            Err(e) => last_error = Some(e),
        }
    }

    Err(RizzError::Embedding(format!(
        "Failed to decode truncated input: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Short single-line preview, safe for multi-byte text.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = normalize_text(text);
    if flat.chars().count() > max_chars {
        let truncated: String = flat.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  loves \n\n  long\twalks  "), "loves long walks");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let arabic = "مرحبا بك في التطبيق";
        let short = preview(arabic, 5);
        assert_eq!(short, "مرحبا...");
        assert_eq!(preview("short", 10), "short");
    }

    #[test]
    fn test_truncate_to_tokens() {
        let bpe = tiktoken_rs::cl100k_base().unwrap();
        let text = "coffee date ".repeat(50);

        let truncated = truncate_to_tokens(&bpe, &text, 10).unwrap();
        assert!(bpe.encode_with_special_tokens(&truncated).len() <= 10);
        assert!(text.starts_with(truncated.trim_end()));

        let untouched = truncate_to_tokens(&bpe, "hello", 10).unwrap();
        assert_eq!(untouched, "hello");
    }

    #[test]
    fn test_truncate_multibyte_text_on_character_boundary() {
        let bpe = tiktoken_rs::cl100k_base().unwrap();
        let samples = ["🙂🙂🙂🙂", "你好世界你好世界", "مرحبا بك في التطبيق، كيف حالك اليوم؟"];

        for text in samples {
            let total = bpe.encode_with_special_tokens(text).len();
            for max in 0..total {
                let truncated = truncate_to_tokens(&bpe, text, max).unwrap();
                assert!(text.starts_with(&truncated), "{:?} cut at {}", text, max);
                assert!(truncated.len() < text.len());
            }
        }
    }
}
