//! Model context limits and the fixed budget allocation.

/// Tokens held back from the context window for the model's own response.
pub const RESPONSE_RESERVE: usize = 4_000;

/// Conservative context limit for models not in the table.
pub const DEFAULT_CONTEXT_LIMIT: usize = 28_000;

/// Cap on the (truncated) system prompt.
pub const SYSTEM_PROMPT_CAP: usize = 500;

/// Cap on the (truncated) rolling summary.
pub const SUMMARY_CAP: usize = 1_500;

/// Budget for retrieved earlier messages.
pub const RAG_BUDGET: usize = 4_000;

/// Budget for verbatim recent messages.
pub const RECENT_BUDGET: usize = 4_000;

/// How many trailing messages count as "recent".
pub const RECENT_WINDOW: usize = 6;

/// Older-than-recent message count that triggers summarization.
pub const SUMMARIZE_THRESHOLD: usize = 10;

/// How many similar older messages retrieval injects.
pub const RETRIEVE_TOP_K: usize = 5;

/// Character cap per retrieved snippet.
pub const SNIPPET_CHARS: usize = 300;

/// Known model context limits, matched by substring against the model id.
/// First match wins, so longer/more specific ids come first.
const MODEL_CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4.1", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5", 16_385),
    ("o1", 128_000),
    ("claude", 200_000),
    ("gemini-1.5", 1_000_000),
    ("gemini", 128_000),
    ("llama-3.1", 128_000),
    ("llama3", 8_192),
    ("llama", 8_192),
    ("mistral", 32_768),
    ("mixtral", 32_768),
    ("qwen", 32_768),
    ("deepseek", 64_000),
];

/// Resolve a model's total context limit.
///
/// Keyed by case-insensitive substring match; unknown models get the
/// conservative default.
pub fn context_limit_for(model_id: &str) -> usize {
    let lower = model_id.to_lowercase();
    MODEL_CONTEXT_LIMITS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_match_by_substring() {
        assert_eq!(context_limit_for("gpt-4o-mini"), 128_000);
        assert_eq!(context_limit_for("claude-sonnet-4"), 200_000);
        assert_eq!(context_limit_for("anthropic/claude-3-haiku"), 200_000);
        assert_eq!(context_limit_for("mistral-7b-instruct"), 32_768);
    }

    #[test]
    fn match_is_case_insensitive() {
        assert_eq!(context_limit_for("GPT-4o"), 128_000);
        assert_eq!(context_limit_for("Claude-Opus"), 200_000);
    }

    #[test]
    fn specific_ids_win_over_general_ones() {
        // "gpt-4-turbo" must not fall through to the plain gpt-4 entry.
        assert_eq!(context_limit_for("gpt-4-turbo-2024"), 128_000);
        assert_eq!(context_limit_for("gpt-4-0613"), 8_192);
    }

    #[test]
    fn unknown_model_gets_conservative_default() {
        assert_eq!(context_limit_for("some-exotic-model"), DEFAULT_CONTEXT_LIMIT);
        assert_eq!(context_limit_for(""), DEFAULT_CONTEXT_LIMIT);
    }

    #[test]
    fn budgets_are_additive_under_the_default_limit() {
        let fixed = SYSTEM_PROMPT_CAP + SUMMARY_CAP + RAG_BUDGET + RECENT_BUDGET;
        assert!(fixed <= DEFAULT_CONTEXT_LIMIT - RESPONSE_RESERVE);
    }
}
