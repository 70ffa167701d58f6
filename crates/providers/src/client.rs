//! The provider HTTP client.
//!
//! Validates input before any network I/O, sends the dialect-specific
//! request, maps non-2xx responses through the error taxonomy, and spawns
//! a reader that parses the body into an ordered delta stream.

use crate::dialect::ProviderDialect;
use crate::error_map::classify_http_error;
use crate::request::build_request;
use crate::sse::{SseEvent, SseParser};
use boundless_core::error::ProviderError;
use boundless_core::provider::{ContextBlock, GenerationParams, StreamDelta};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A streaming chat client for one configured provider.
pub struct ChatClient {
    base_url: String,
    api_key: Option<String>,
    dialect: ProviderDialect,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a client for a provider base URL. The dialect is classified
    /// from the URL once, here.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let dialect = ProviderDialect::classify(&base_url);

        // No total timeout on the client: streams outlive any fixed
        // bound, and the ingestion driver owns both timers.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            api_key,
            dialect,
            client,
        }
    }

    pub fn dialect(&self) -> ProviderDialect {
        self.dialect
    }

    /// Open a streaming chat request and return the ordered delta stream.
    ///
    /// Input problems (no model, empty context) are rejected before any
    /// network traffic.
    pub async fn stream_chat(
        &self,
        model: &str,
        blocks: &[ContextBlock],
        params: &GenerationParams,
    ) -> Result<mpsc::Receiver<Result<StreamDelta, ProviderError>>, ProviderError> {
        if model.trim().is_empty() {
            return Err(ProviderError::NoModelSelected);
        }
        if blocks
            .iter()
            .all(|b| b.content.trim().is_empty() && b.images.is_empty())
        {
            return Err(ProviderError::EmptyPrompt);
        }

        let request = build_request(
            self.dialect,
            &self.base_url,
            self.api_key.as_deref(),
            model,
            blocks,
            params,
        );

        debug!(dialect = %self.dialect, model, url = %request.url, "Sending streaming request");

        let mut builder = self
            .client
            .post(&request.url)
            .header("accept", "text/event-stream");
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.json(&request.body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Provider returned an error response");
            return Err(classify_http_error(status, &body));
        }

        let (tx, rx) = mpsc::channel(64);
        let dialect = self.dialect;

        tokio::spawn(async move {
            let mut parser = SseParser::new(dialect);
            let mut byte_stream = response.bytes_stream();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for event in parser.push(&String::from_utf8_lossy(&bytes)) {
                    match event {
                        SseEvent::Delta(delta) => {
                            if tx.send(Ok(delta)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Done => {
                            let _ = tx.send(Ok(StreamDelta::done())).await;
                            return;
                        }
                        SseEvent::Error(error) => {
                            let _ = tx.send(Err(error)).await;
                            return;
                        }
                    }
                }
            }

            // Body closed without a terminal event: flush the trailing
            // buffer best-effort, then signal completion.
            match parser.finish() {
                Some(SseEvent::Delta(delta)) => {
                    let _ = tx.send(Ok(delta)).await;
                }
                Some(SseEvent::Error(error)) => {
                    let _ = tx.send(Err(error)).await;
                    return;
                }
                _ => {}
            }
            let _ = tx.send(Ok(StreamDelta::done())).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundless_core::message::Role;

    #[tokio::test]
    async fn rejects_missing_model_before_any_network() {
        let client = ChatClient::new("https://api.openai.com/v1", Some("k".into()));
        let blocks = vec![ContextBlock::new(Role::User, "hello")];
        let err = client
            .stream_chat("  ", &blocks, &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NoModelSelected));
    }

    #[tokio::test]
    async fn rejects_empty_context_before_any_network() {
        let client = ChatClient::new("https://api.openai.com/v1", Some("k".into()));
        let err = client
            .stream_chat("gpt-4o", &[], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyPrompt));

        let blank = vec![ContextBlock::new(Role::User, "   ")];
        let err = client
            .stream_chat("gpt-4o", &blank, &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyPrompt));
    }

    #[test]
    fn dialect_classified_from_base_url() {
        let client = ChatClient::new("https://api.anthropic.com/", None);
        assert_eq!(client.dialect(), ProviderDialect::Anthropic);

        let client = ChatClient::new("http://localhost:11434", None);
        assert_eq!(client.dialect(), ProviderDialect::Ollama);
    }
}
