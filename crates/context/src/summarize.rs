//! Summarization trigger — a pure decision function.
//!
//! Flags when accumulated older messages should be condensed and returns
//! exactly those messages for an external summarizer. Nothing here calls
//! a model; the engine owns the async hand-off and persists the result.

use crate::limits::{RECENT_WINDOW, SUMMARIZE_THRESHOLD};
use boundless_core::message::Message;

/// Decide whether the conversation needs summarization.
///
/// Returns the messages older than the recent window when there are more
/// than the threshold of them and no summary exists yet; `None` otherwise.
pub fn summarization_needed(messages: &[Message], has_summary: bool) -> Option<&[Message]> {
    if has_summary || messages.len() <= RECENT_WINDOW {
        return None;
    }

    let older = &messages[..messages.len() - RECENT_WINDOW];
    if older.len() > SUMMARIZE_THRESHOLD {
        Some(older)
    } else {
        None
    }
}
