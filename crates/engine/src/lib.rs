//! # Boundless Engine
//!
//! The orchestrating facade consumed by the UI layer. Wires together the
//! storage substrate, semantic memory, context assembly, and streaming
//! ingestion into the send/regenerate/edit flows, and owns the
//! cross-cutting rules: persist-before-assemble ordering, fire-and-forget
//! background embedding, forward-only summary watermarks, and
//! migration-on-switch for storage backends.

pub mod engine;
pub mod media;
pub mod telemetry;

pub use engine::{ChatEngine, SendOutcome};
pub use media::media_id;
