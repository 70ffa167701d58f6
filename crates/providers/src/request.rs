//! Dialect-specific request building.
//!
//! Turns assembled context blocks into the provider's wire format. The
//! dialects differ most in image encoding:
//! - OpenAI-compatible: `image_url` content part with a data URL
//! - Anthropic: a structured `source` object with an explicit media type
//! - Google: `inline_data` parts with a `mime_type`
//! - Ollama: a parallel `images` array of raw base64 strings

use crate::dialect::ProviderDialect;
use boundless_core::message::Role;
use boundless_core::provider::{ContextBlock, GenerationParams};
use serde_json::{Value, json};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A fully built provider request: endpoint, headers, JSON body.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Build a streaming chat request for the given dialect.
///
/// `vision` marks a request carrying images; some providers cap
/// `max_tokens` on those.
pub fn build_request(
    dialect: ProviderDialect,
    base_url: &str,
    api_key: Option<&str>,
    model: &str,
    blocks: &[ContextBlock],
    params: &GenerationParams,
) -> ChatRequest {
    let vision = blocks.iter().any(|b| !b.images.is_empty());
    let max_tokens = match (vision, dialect.vision_max_tokens_cap()) {
        (true, Some(cap)) => params.max_tokens.min(cap),
        _ => params.max_tokens,
    };

    let body = match dialect {
        ProviderDialect::OpenAiCompatible => openai_body(model, blocks, params, max_tokens),
        ProviderDialect::Anthropic => anthropic_body(model, blocks, params, max_tokens),
        ProviderDialect::GoogleNative => google_body(blocks, params, max_tokens),
        ProviderDialect::Ollama => ollama_body(model, blocks, params, max_tokens),
    };

    let mut headers: Vec<(&'static str, String)> = vec![("content-type", "application/json".into())];
    if dialect.wants_auth() {
        if let Some(key) = api_key {
            match dialect {
                ProviderDialect::Anthropic => {
                    headers.push(("x-api-key", key.to_string()));
                    headers.push(("anthropic-version", ANTHROPIC_VERSION.into()));
                }
                ProviderDialect::GoogleNative => {
                    headers.push(("x-goog-api-key", key.to_string()));
                }
                _ => headers.push(("authorization", format!("Bearer {key}"))),
            }
        } else if dialect == ProviderDialect::Anthropic {
            headers.push(("anthropic-version", ANTHROPIC_VERSION.into()));
        }
    }

    ChatRequest {
        url: dialect.chat_endpoint(base_url, model),
        headers,
        body,
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn openai_body(
    model: &str,
    blocks: &[ContextBlock],
    params: &GenerationParams,
    max_tokens: u32,
) -> Value {
    let messages: Vec<Value> = blocks
        .iter()
        .map(|b| {
            let content = if b.images.is_empty() {
                json!(b.content)
            } else {
                let mut parts = vec![json!({"type": "text", "text": b.content})];
                for img in &b.images {
                    parts.push(json!({
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", img.media_type, img.data)
                        }
                    }));
                }
                json!(parts)
            };
            json!({"role": role_str(b.role), "content": content})
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": params.temperature,
        "stream": true,
        "max_tokens": max_tokens,
    });

    // Optional sampling parameters only go to dialects that accept them.
    if let Some(top_p) = params.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(fp) = params.frequency_penalty {
        body["frequency_penalty"] = json!(fp);
    }
    if let Some(pp) = params.presence_penalty {
        body["presence_penalty"] = json!(pp);
    }

    body
}

fn anthropic_body(
    model: &str,
    blocks: &[ContextBlock],
    params: &GenerationParams,
    max_tokens: u32,
) -> Value {
    // Anthropic takes the system prompt as a top-level field.
    let system: Vec<&str> = blocks
        .iter()
        .filter(|b| b.role == Role::System)
        .map(|b| b.content.as_str())
        .collect();

    let messages: Vec<Value> = blocks
        .iter()
        .filter(|b| b.role != Role::System)
        .map(|b| {
            let content = if b.images.is_empty() {
                json!(b.content)
            } else {
                let mut parts: Vec<Value> = b
                    .images
                    .iter()
                    .map(|img| {
                        json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": img.media_type,
                                "data": img.data,
                            }
                        })
                    })
                    .collect();
                parts.push(json!({"type": "text", "text": b.content}));
                json!(parts)
            };
            json!({"role": role_str(b.role), "content": content})
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": params.temperature,
        "stream": true,
    });

    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }

    body
}

fn google_body(blocks: &[ContextBlock], params: &GenerationParams, max_tokens: u32) -> Value {
    let system: Vec<&str> = blocks
        .iter()
        .filter(|b| b.role == Role::System)
        .map(|b| b.content.as_str())
        .collect();

    let contents: Vec<Value> = blocks
        .iter()
        .filter(|b| b.role != Role::System)
        .map(|b| {
            let mut parts = vec![json!({"text": b.content})];
            for img in &b.images {
                parts.push(json!({
                    "inline_data": {"mime_type": img.media_type, "data": img.data}
                }));
            }
            let role = match b.role {
                Role::Assistant => "model",
                _ => "user",
            };
            json!({"role": role, "parts": parts})
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": params.temperature,
            "maxOutputTokens": max_tokens,
        },
    });

    if !system.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
    }

    body
}

fn ollama_body(
    model: &str,
    blocks: &[ContextBlock],
    params: &GenerationParams,
    max_tokens: u32,
) -> Value {
    let messages: Vec<Value> = blocks
        .iter()
        .map(|b| {
            let mut msg = json!({"role": role_str(b.role), "content": b.content});
            if !b.images.is_empty() {
                let images: Vec<&str> = b.images.iter().map(|i| i.data.as_str()).collect();
                msg["images"] = json!(images);
            }
            msg
        })
        .collect();

    json!({
        "model": model,
        "messages": messages,
        "stream": true,
        "options": {
            "temperature": params.temperature,
            "num_predict": max_tokens,
        },
    })
}
