//! Provider dialects and streaming response ingestion.
//!
//! One classification function maps a base URL to a closed
//! [`ProviderDialect`]; request building, image encoding, and stream
//! parsing are methods of that variant, so provider string checks never
//! leak into the rest of the engine.
//!
//! The ingestion state machine per request:
//! `Idle → Sending → Streaming → {Completed | StalledRecovered | Failed}`.

pub mod client;
pub mod dialect;
pub mod error_map;
pub mod ingest;
pub mod request;
pub mod sse;

pub use client::ChatClient;
pub use dialect::ProviderDialect;
pub use error_map::classify_http_error;
pub use ingest::{IngestOptions, IngestOutcome, IngestResult, StreamHandler, ingest};
pub use sse::{SseEvent, SseParser};
