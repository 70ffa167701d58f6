//! Streaming ingestion — the per-request state machine.
//!
//! `Idle → Sending → Streaming → {Completed | StalledRecovered | Failed}`
//!
//! Two timers run concurrently: a per-chunk stall timeout that resets on
//! every received event, and an overall request deadline that never
//! resets. Whichever fires first governs the outcome. The caller can
//! cancel at any time through a watch channel; a caller-initiated cancel
//! is a clean completion, never an error.

use boundless_core::error::ProviderError;
use boundless_core::provider::{StreamDelta, StreamNotice};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Callbacks surfaced to the UI layer for one send/regenerate operation.
#[async_trait::async_trait]
pub trait StreamHandler: Send + Sync {
    /// Incremental text, in arrival order.
    async fn on_chunk(&self, text: &str);

    /// The turn finished (including stall-recovered and cancelled turns).
    async fn on_complete(&self);

    /// The turn failed; `error` renders a human-readable message.
    async fn on_error(&self, error: &ProviderError);
}

/// Timeout configuration for one request.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Bound on each individual read. Shorter than the request timeout.
    pub stall_timeout: Duration,

    /// Bound on the whole request.
    pub request_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(180),
        }
    }
}

/// How an ingested stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Natural end with content.
    Completed,
    /// Stalled after partial output; closed with a visible notice.
    StalledRecovered,
    /// Caller-initiated cancellation.
    Cancelled,
}

/// The accumulated result of a successfully ingested stream.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub text: String,
    pub outcome: IngestOutcome,
}

/// Drive a delta stream to completion, invoking the handler as events
/// arrive. Returns the accumulated text alongside the outcome.
pub async fn ingest<H: StreamHandler>(
    mut rx: mpsc::Receiver<Result<StreamDelta, ProviderError>>,
    handler: &H,
    opts: &IngestOptions,
    mut cancel: watch::Receiver<bool>,
) -> Result<IngestResult, ProviderError> {
    let overall = tokio::time::sleep(opts.request_timeout);
    tokio::pin!(overall);

    let mut text = String::new();
    let mut got_content = false;
    let mut cancel_open = true;

    loop {
        tokio::select! {
            // Caller cancellation: a clean completion, not an error.
            changed = cancel.changed(), if cancel_open => {
                match changed {
                    Ok(()) if *cancel.borrow() => {
                        debug!("Stream cancelled by caller");
                        handler.on_complete().await;
                        return Ok(IngestResult { text, outcome: IngestOutcome::Cancelled });
                    }
                    Ok(()) => {}
                    // Cancel handle dropped: the caller can no longer
                    // cancel; stop polling the closed channel.
                    Err(_) => cancel_open = false,
                }
            }

            // Overall deadline: always a hard failure.
            _ = &mut overall => {
                warn!("Request timed out");
                let error = ProviderError::Timeout;
                handler.on_error(&error).await;
                return Err(error);
            }

            // Per-chunk stall timer, recreated (reset) every iteration.
            _ = tokio::time::sleep(opts.stall_timeout) => {
                if got_content {
                    // Partial output is worth keeping: close the turn with
                    // a visible notice instead of erroring it.
                    let notice = StreamNotice::Stalled.display_text();
                    warn!("Stream stalled after partial output; recovering");
                    text.push_str(notice);
                    handler.on_chunk(notice).await;
                    handler.on_complete().await;
                    return Ok(IngestResult { text, outcome: IngestOutcome::StalledRecovered });
                }
                warn!("Stream stalled before any output");
                let error = ProviderError::Timeout;
                handler.on_error(&error).await;
                return Err(error);
            }

            received = rx.recv() => match received {
                Some(Ok(delta)) => {
                    if let Some(content) = delta.content.as_deref() {
                        if !content.is_empty() {
                            got_content = true;
                            text.push_str(content);
                            handler.on_chunk(content).await;
                        }
                    }

                    if let Some(notice) = delta.notice {
                        let notice_text = notice.display_text();
                        text.push_str(notice_text);
                        handler.on_chunk(notice_text).await;
                    }

                    if delta.done {
                        if !got_content {
                            // A stream that "succeeds" without emitting
                            // anything is an upstream problem, not a
                            // success.
                            let error = ProviderError::EmptyResponse;
                            handler.on_error(&error).await;
                            return Err(error);
                        }
                        handler.on_complete().await;
                        return Ok(IngestResult { text, outcome: IngestOutcome::Completed });
                    }
                }
                Some(Err(error)) => {
                    handler.on_error(&error).await;
                    return Err(error);
                }
                None => {
                    // Body closed without a terminal marker.
                    if !got_content {
                        let error = ProviderError::EmptyResponse;
                        handler.on_error(&error).await;
                        return Err(error);
                    }
                    handler.on_complete().await;
                    return Ok(IngestResult { text, outcome: IngestOutcome::Completed });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        chunks: Mutex<Vec<String>>,
        completions: Mutex<usize>,
        errors: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl StreamHandler for Recording {
        async fn on_chunk(&self, text: &str) {
            self.chunks.lock().unwrap().push(text.to_string());
        }
        async fn on_complete(&self) {
            *self.completions.lock().unwrap() += 1;
        }
        async fn on_error(&self, error: &ProviderError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn opts() -> IngestOptions {
        IngestOptions {
            stall_timeout: Duration::from_millis(100),
            request_timeout: Duration::from_secs(10),
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn two_chunks_then_done() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamDelta::content("Hel"))).await.unwrap();
        tx.send(Ok(StreamDelta::content("lo"))).await.unwrap();
        tx.send(Ok(StreamDelta::done())).await.unwrap();

        let handler = Recording::default();
        let result = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap();

        assert_eq!(result.text, "Hello");
        assert_eq!(result.outcome, IngestOutcome::Completed);
        assert_eq!(*handler.chunks.lock().unwrap(), vec!["Hel", "lo"]);
        assert_eq!(*handler.completions.lock().unwrap(), 1);
        assert!(handler.errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stall_after_content_recovers_with_notice() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            tx.send(Ok(StreamDelta::content("partial"))).await.unwrap();
            // Never send anything else; hold the sender open past the
            // stall timeout.
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let handler = Recording::default();
        let result = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap();

        assert_eq!(result.outcome, IngestOutcome::StalledRecovered);
        assert!(result.text.starts_with("partial"));
        assert!(result.text.contains("[response stopped]"));
        assert_eq!(*handler.completions.lock().unwrap(), 1);
        assert!(handler.errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stall_before_content_is_a_hard_failure() {
        let (tx, rx) = mpsc::channel::<Result<StreamDelta, ProviderError>>(8);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let handler = Recording::default();
        let err = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Timeout));
        assert_eq!(*handler.completions.lock().unwrap(), 0);
        assert_eq!(handler.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_content_done_is_an_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamDelta::done())).await.unwrap();

        let handler = Recording::default();
        let err = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap_err();

        assert!(matches!(err, ProviderError::EmptyResponse));
        assert_eq!(*handler.completions.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_content_body_close_is_an_error() {
        let (tx, rx) = mpsc::channel::<Result<StreamDelta, ProviderError>>(8);
        drop(tx);

        let handler = Recording::default();
        let err = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn body_close_after_content_completes() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamDelta::content("done without marker")))
            .await
            .unwrap();
        drop(tx);

        let handler = Recording::default();
        let result = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap();
        assert_eq!(result.outcome, IngestOutcome::Completed);
        assert_eq!(result.text, "done without marker");
    }

    #[tokio::test(start_paused = true)]
    async fn mid_stream_error_propagates() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamDelta::content("oops"))).await.unwrap();
        tx.send(Err(ProviderError::StreamInterrupted("overloaded".into())))
            .await
            .unwrap();

        let handler = Recording::default();
        let err = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap_err();

        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
        assert_eq!(handler.errors.lock().unwrap().len(), 1);
        assert_eq!(*handler.completions.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancel_is_a_clean_completion() {
        let (tx, rx) = mpsc::channel(8);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            tx.send(Ok(StreamDelta::content("some"))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_tx.send(true).unwrap();
            // Hold the data sender open so only the cancel fires.
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let handler = Recording::default();
        let result = ingest(rx, &handler, &opts(), cancel_rx).await.unwrap();

        assert_eq!(result.outcome, IngestOutcome::Cancelled);
        assert_eq!(result.text, "some");
        assert_eq!(*handler.completions.lock().unwrap(), 1);
        assert!(handler.errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_beats_a_slow_drip() {
        // A stream that keeps sending just often enough to reset the
        // stall timer must still hit the overall deadline.
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                if tx.send(Ok(StreamDelta::content("."))).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let handler = Recording::default();
        let tight = IngestOptions {
            stall_timeout: Duration::from_millis(100),
            request_timeout: Duration::from_millis(400),
        };
        let err = ingest(rx, &handler, &tight, no_cancel()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn truncation_notice_is_appended_and_stream_completes() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamDelta::content("cut off"))).await.unwrap();
        tx.send(Ok(StreamDelta::notice(StreamNotice::Truncated)))
            .await
            .unwrap();
        tx.send(Ok(StreamDelta::done())).await.unwrap();

        let handler = Recording::default();
        let result = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap();

        assert!(result.text.contains("cut off"));
        assert!(result.text.contains("[response truncated"));
        assert_eq!(result.outcome, IngestOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_order_is_preserved() {
        let (tx, rx) = mpsc::channel(64);
        let expected: String = (0..50).map(|i| format!("w{i} ")).collect();
        for i in 0..50 {
            tx.send(Ok(StreamDelta::content(format!("w{i} "))))
                .await
                .unwrap();
        }
        tx.send(Ok(StreamDelta::done())).await.unwrap();

        let handler = Recording::default();
        let result = ingest(rx, &handler, &opts(), no_cancel()).await.unwrap();
        assert_eq!(result.text, expected);
    }
}
