//! Provider dialect classification.
//!
//! Providers differ in endpoint shape, authentication, image encoding,
//! and which generation parameters they accept. All of that is keyed off
//! a closed set of variants produced by one classification function —
//! base-URL string matching lives here and nowhere else.

use serde::{Deserialize, Serialize};

/// Output cap applied to vision-enabled requests on providers that
/// reject large `max_tokens` when images are attached.
pub const VISION_MAX_TOKENS: u32 = 4_096;

/// The closed set of wire dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderDialect {
    /// OpenAI, OpenRouter, vLLM, Together, and other `/chat/completions`
    /// compatibles.
    OpenAiCompatible,
    /// Anthropic's native Messages API.
    Anthropic,
    /// Google's native `generateContent` API.
    GoogleNative,
    /// A local Ollama daemon.
    Ollama,
}

impl ProviderDialect {
    /// Classify a base URL into a dialect.
    pub fn classify(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();
        if lower.contains("anthropic") {
            Self::Anthropic
        } else if lower.contains("googleapis") || lower.contains("generativelanguage") {
            Self::GoogleNative
        } else if lower.contains("ollama") || lower.contains(":11434") {
            Self::Ollama
        } else {
            Self::OpenAiCompatible
        }
    }

    /// The chat endpoint for this dialect.
    pub fn chat_endpoint(&self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::OpenAiCompatible => format!("{base}/chat/completions"),
            Self::Anthropic => format!("{base}/v1/messages"),
            Self::GoogleNative => {
                format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse")
            }
            Self::Ollama => format!("{base}/api/chat"),
        }
    }

    /// Whether this dialect accepts `top_p` / `frequency_penalty` /
    /// `presence_penalty`. Sending them to a provider that rejects them
    /// fails the whole request, so they are omitted unless supported.
    pub fn supports_sampling_extras(&self) -> bool {
        matches!(self, Self::OpenAiCompatible)
    }

    /// Whether requests carry an auth credential at all.
    /// Local daemons run unauthenticated.
    pub fn wants_auth(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Cap on `max_tokens` for vision requests, where the provider
    /// enforces one.
    pub fn vision_max_tokens_cap(&self) -> Option<u32> {
        match self {
            Self::OpenAiCompatible => Some(VISION_MAX_TOKENS),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenAiCompatible => "openai-compatible",
            Self::Anthropic => "anthropic",
            Self::GoogleNative => "google",
            Self::Ollama => "ollama",
        };
        f.write_str(name)
    }
}
