//! Incremental parsing of streamed provider responses.
//!
//! The reader feeds raw text chunks into [`SseParser::push`]; complete
//! lines come back as [`SseEvent`]s. A literal `data: [DONE]` ends the
//! stream; envelopes may carry a text delta, an error payload, or a
//! finish reason. Malformed lines are skipped, never fatal. Whatever is
//! left in the buffer when the body closes is parsed best-effort by
//! [`SseParser::finish`].

use crate::dialect::ProviderDialect;
use crate::error_map::ApiErrorDetail;
use boundless_core::error::ProviderError;
use boundless_core::provider::{StreamDelta, StreamNotice};
use serde::Deserialize;
use tracing::trace;

/// A parsed stream event.
#[derive(Debug, Clone)]
pub enum SseEvent {
    /// An incremental delta (content and/or a finish-reason notice).
    Delta(StreamDelta),
    /// The stream ended successfully.
    Done,
    /// The provider reported an error mid-stream; fails the turn.
    Error(ProviderError),
}

/// Incremental line-buffered parser for one streaming response.
pub struct SseParser {
    dialect: ProviderDialect,
    buffer: String,
}

impl SseParser {
    pub fn new(dialect: ProviderDialect) -> Self {
        Self {
            dialect,
            buffer: String::new(),
        }
    }

    /// Feed a chunk of response body; returns events for every complete
    /// line it contained.
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
            self.buffer.drain(..=line_end);

            if let Some(event) = self.parse_line(&line) {
                let done = matches!(event, SseEvent::Done | SseEvent::Error(_));
                events.push(event);
                if done {
                    break;
                }
            }
        }

        events
    }

    /// Best-effort parse of the trailing buffer at stream end.
    pub fn finish(mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.parse_line(line)
    }

    fn parse_line(&self, line: &str) -> Option<SseEvent> {
        // Skip blanks, SSE comments, and `event:` framing lines.
        if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
            return None;
        }

        let payload = match line.strip_prefix("data:") {
            Some(rest) => rest.trim(),
            // Ollama streams bare JSON lines with no SSE framing.
            None if self.dialect == ProviderDialect::Ollama => line,
            None => return None,
        };

        if payload == "[DONE]" {
            return Some(SseEvent::Done);
        }

        let event = match self.dialect {
            ProviderDialect::Anthropic => parse_anthropic(payload),
            ProviderDialect::GoogleNative => parse_google(payload),
            ProviderDialect::Ollama => parse_ollama(payload),
            ProviderDialect::OpenAiCompatible => parse_openai(payload),
        };

        if event.is_none() {
            trace!(payload, "Skipping unparseable stream line");
        }
        event
    }
}

fn notice_for(finish_reason: &str) -> Option<StreamNotice> {
    match finish_reason {
        "length" | "max_tokens" => Some(StreamNotice::Truncated),
        "content_filter" => Some(StreamNotice::ContentFiltered),
        _ => None,
    }
}

// ── OpenAI-compatible ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_openai(payload: &str) -> Option<SseEvent> {
    let chunk: OpenAiChunk = serde_json::from_str(payload).ok()?;

    if let Some(error) = chunk.error {
        let message = error
            .message
            .or(error.kind)
            .unwrap_or_else(|| "provider reported an error".into());
        return Some(SseEvent::Error(ProviderError::StreamInterrupted(message)));
    }

    let choice = chunk.choices.into_iter().next()?;
    let notice = choice.finish_reason.as_deref().and_then(notice_for);
    let content = choice.delta.content.filter(|c| !c.is_empty());

    if content.is_none() && notice.is_none() {
        // Keep-alive or role-only delta; nothing to emit.
        return None;
    }

    Some(SseEvent::Delta(StreamDelta {
        content,
        notice,
        done: false,
    }))
}

// ── Anthropic ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

fn parse_anthropic(payload: &str) -> Option<SseEvent> {
    let event: AnthropicEvent = serde_json::from_str(payload).ok()?;

    match event.kind.as_str() {
        "content_block_delta" => {
            let text = event.delta.and_then(|d| d.text).filter(|t| !t.is_empty())?;
            Some(SseEvent::Delta(StreamDelta::content(text)))
        }
        "message_delta" => {
            let notice = event
                .delta
                .and_then(|d| d.stop_reason)
                .as_deref()
                .and_then(notice_for)?;
            Some(SseEvent::Delta(StreamDelta::notice(notice)))
        }
        "message_stop" => Some(SseEvent::Done),
        "error" => {
            let message = event
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "provider reported an error".into());
            Some(SseEvent::Error(ProviderError::StreamInterrupted(message)))
        }
        // ping, message_start, content_block_start/stop carry no text.
        _ => None,
    }
}

// ── Google native ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: Option<String>,
}

fn parse_google(payload: &str) -> Option<SseEvent> {
    let chunk: GoogleChunk = serde_json::from_str(payload).ok()?;

    if let Some(error) = chunk.error {
        let message = error
            .message
            .unwrap_or_else(|| "provider reported an error".into());
        return Some(SseEvent::Error(ProviderError::StreamInterrupted(message)));
    }

    let candidate = chunk.candidates.into_iter().next()?;
    let notice = match candidate.finish_reason.as_deref() {
        Some(r) if r.eq_ignore_ascii_case("max_tokens") => Some(StreamNotice::Truncated),
        Some(r) if r.eq_ignore_ascii_case("safety") => Some(StreamNotice::ContentFiltered),
        _ => None,
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() && notice.is_none() {
        return None;
    }

    Some(SseEvent::Delta(StreamDelta {
        content: (!text.is_empty()).then_some(text),
        notice,
        done: false,
    }))
}

// ── Ollama ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

fn parse_ollama(payload: &str) -> Option<SseEvent> {
    let chunk: OllamaChunk = serde_json::from_str(payload).ok()?;

    if let Some(message) = chunk.error {
        return Some(SseEvent::Error(ProviderError::StreamInterrupted(message)));
    }

    if chunk.done {
        return Some(SseEvent::Done);
    }

    let content = chunk.message.map(|m| m.content).filter(|c| !c.is_empty())?;
    Some(SseEvent::Delta(StreamDelta::content(content)))
}
