//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This is
//! accurate within ~10% for BPE tokenizers on English text and exact for
//! none of them — the approximation trades accuracy for zero dependency
//! weight. All budget arithmetic in this crate uses these estimates.

use boundless_core::message::Message;
use boundless_core::provider::ContextBlock;

/// Per-message overhead for role name, delimiters, and wire framing.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up. Empty text is 0.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a context block including per-message overhead.
pub fn estimate_block_tokens(block: &ContextBlock) -> usize {
    MESSAGE_OVERHEAD + estimate_tokens(&block.content)
}

/// Estimate tokens for a slice of context blocks.
pub fn estimate_blocks_tokens(blocks: &[ContextBlock]) -> usize {
    blocks.iter().map(estimate_block_tokens).sum()
}

/// Estimate tokens for a message, preferring its cached count.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD
        + message
            .token_count
            .unwrap_or_else(|| estimate_tokens(&message.content))
}

/// Truncate text so its estimate fits within `max_tokens`, respecting
/// char boundaries.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundless_core::message::Role;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn this_is_an_approximation_not_a_tokenizer() {
        // "über" is 2 tokens in most BPE vocabularies; the heuristic
        // counts bytes/4 and lands on 2 only by accident of UTF-8 length.
        // The contract is ceil(byte_len / 4), nothing more.
        assert_eq!(estimate_tokens("über"), 2);
    }

    #[test]
    fn block_includes_overhead() {
        let block = ContextBlock::new(Role::User, "test"); // 1 token + 4 overhead
        assert_eq!(estimate_block_tokens(&block), 5);
    }

    #[test]
    fn blocks_sum() {
        let blocks = vec![
            ContextBlock::new(Role::User, "hello"),      // 2 + 4
            ContextBlock::new(Role::Assistant, "world"), // 2 + 4
        ];
        assert_eq!(estimate_blocks_tokens(&blocks), 12);
    }

    #[test]
    fn message_prefers_cached_count() {
        let mut msg = boundless_core::message::Message::user("hello world");
        msg.token_count = Some(100);
        assert_eq!(estimate_message_tokens(&msg), 104);

        msg.token_count = None;
        assert_eq!(estimate_message_tokens(&msg), 4 + 3);
    }

    #[test]
    fn truncate_fits_budget() {
        let text = "a".repeat(1000);
        let truncated = truncate_to_tokens(&text, 10);
        assert_eq!(truncated.len(), 40);
        assert_eq!(estimate_tokens(truncated), 10);
    }

    #[test]
    fn truncate_short_text_untouched() {
        assert_eq!(truncate_to_tokens("short", 100), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // 'é' is two bytes; a cut in the middle must back off.
        let text = "éééééééééé";
        let truncated = truncate_to_tokens(text, 1); // 4 bytes → lands mid-char
        assert!(truncated.len() <= 4);
        assert!(text.starts_with(truncated));
    }
}
