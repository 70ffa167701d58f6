//! Context assembly — the orchestrating algorithm.
//!
//! Given the full message history, a system prompt, and the target model,
//! produces an ordered list of role-tagged blocks that fits the model's
//! context window minus a response reserve. Sources are filled in
//! priority order; each subsequent step spends the remaining budget.
//!
//! Retrieval is best-effort and never blocks assembly; a summary fetch
//! failure propagates so the engine can take the memory-free fallback.

use crate::limits::{
    RAG_BUDGET, RECENT_BUDGET, RECENT_WINDOW, RESPONSE_RESERVE, RETRIEVE_TOP_K, SNIPPET_CHARS,
    SUMMARY_CAP, SYSTEM_PROMPT_CAP, context_limit_for,
};
use crate::summarize::summarization_needed;
use crate::token::{
    estimate_block_tokens, estimate_blocks_tokens, estimate_message_tokens, estimate_tokens,
    truncate_to_tokens,
};
use boundless_core::error::ContextError;
use boundless_core::message::{Message, Role};
use boundless_core::provider::ContextBlock;
use boundless_memory::SemanticMemory;
use std::sync::Arc;
use tracing::debug;

const SUMMARY_OPEN: &str = "[CONVERSATION SUMMARY]";
const SUMMARY_CLOSE: &str = "[END SUMMARY]";
const RETRIEVAL_HEADER: &str = "[Relevant Earlier Messages]";

/// The assembled context, ready for a provider request.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Ordered role-tagged blocks.
    pub blocks: Vec<ContextBlock>,

    /// Estimated total token cost of `blocks`.
    pub token_count: usize,

    /// Whether the caller should run the summarizer now.
    pub needs_summarization: bool,

    /// Exactly the messages the summarizer should condense.
    pub pending_summarization: Vec<Message>,
}

/// The context assembler. Stateless apart from its collaborators —
/// create one and reuse it.
pub struct ContextAssembler {
    memory: Arc<SemanticMemory>,
}

impl ContextAssembler {
    pub fn new(memory: Arc<SemanticMemory>) -> Self {
        Self { memory }
    }

    /// Assemble context for one turn.
    ///
    /// # Algorithm
    ///
    /// 1. Resolve the model's context limit, subtract the response reserve
    /// 2. System prompt — truncated to its cap, always included if non-empty
    /// 3. Rolling summary — fetched from storage, truncated, delimiter-wrapped
    /// 4. Semantic retrieval — best-effort bullet snippets, failures swallowed
    /// 5. Recent messages — last 6 verbatim, oldest excluded first on overflow
    /// 6. Summarization flag — when enough older messages and no summary yet
    pub async fn assemble(
        &self,
        conversation_id: &str,
        messages: &[Message],
        system_prompt: &str,
        model_id: &str,
    ) -> Result<AssembledContext, ContextError> {
        let limit = context_limit_for(model_id);
        let working = limit.saturating_sub(RESPONSE_RESERVE);
        let mut remaining = working;
        let mut blocks: Vec<ContextBlock> = Vec::new();

        // ── 1. System prompt ─────────────────────────────────────────────
        if !system_prompt.is_empty() {
            let block = system_block(system_prompt, remaining);
            remaining = remaining.saturating_sub(estimate_block_tokens(&block));
            blocks.push(block);
        }

        // ── 2. Rolling summary ───────────────────────────────────────────
        let summary = self
            .memory
            .get_summary(conversation_id)
            .await
            .map_err(|e| ContextError::Storage(e.to_string()))?;
        let has_summary = summary.is_some();
        if let Some(summary) = &summary {
            if let Some(block) = summary_block(&summary.summary, remaining) {
                remaining = remaining.saturating_sub(estimate_block_tokens(&block));
                blocks.push(block);
            }
        }

        // ── 3. Semantic retrieval ────────────────────────────────────────
        if messages.len() > RECENT_WINDOW {
            let recent = &messages[messages.len() - RECENT_WINDOW..];
            let query: String = recent
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            if !query.is_empty() {
                let exclude: Vec<String> = recent.iter().map(|m| m.id.clone()).collect();
                // Best-effort: retrieve() degrades to empty on any failure.
                let hits = self
                    .memory
                    .retrieve(conversation_id, &query, RETRIEVE_TOP_K, &exclude)
                    .await;

                if let Some(block) = retrieval_block(
                    hits.iter().map(|h| h.record.content_snapshot.as_str()),
                    RAG_BUDGET.min(remaining),
                ) {
                    remaining = remaining.saturating_sub(estimate_block_tokens(&block));
                    blocks.push(block);
                }
            }
        }

        // ── 4. Recent messages ───────────────────────────────────────────
        let recent_start = messages.len().saturating_sub(RECENT_WINDOW);
        blocks.extend(recent_blocks(
            &messages[recent_start..],
            RECENT_BUDGET.min(remaining),
        ));

        // ── 5. Summarization flag ────────────────────────────────────────
        let pending = summarization_needed(messages, has_summary)
            .map(<[Message]>::to_vec)
            .unwrap_or_default();

        let token_count = estimate_blocks_tokens(&blocks);
        debug!(
            conversation_id,
            model_id,
            token_count,
            budget = working,
            blocks = blocks.len(),
            needs_summarization = !pending.is_empty(),
            "Context assembled"
        );

        Ok(AssembledContext {
            blocks,
            token_count,
            needs_summarization: !pending.is_empty(),
            pending_summarization: pending,
        })
    }

    /// Memory-free fallback: system prompt + caller-provided summary +
    /// as many recent messages as fit.
    ///
    /// Uses the same reserve-subtracted budget as the full path so both
    /// leave room for the model's response.
    pub fn assemble_minimal(
        messages: &[Message],
        system_prompt: &str,
        summary: Option<&str>,
        model_id: &str,
    ) -> AssembledContext {
        let limit = context_limit_for(model_id);
        let mut remaining = limit.saturating_sub(RESPONSE_RESERVE);
        let mut blocks: Vec<ContextBlock> = Vec::new();

        if !system_prompt.is_empty() {
            let block = system_block(system_prompt, remaining);
            remaining = remaining.saturating_sub(estimate_block_tokens(&block));
            blocks.push(block);
        }

        if let Some(summary) = summary {
            if let Some(block) = summary_block(summary, remaining) {
                remaining = remaining.saturating_sub(estimate_block_tokens(&block));
                blocks.push(block);
            }
        }

        blocks.extend(recent_blocks(messages, remaining));

        let token_count = estimate_blocks_tokens(&blocks);
        AssembledContext {
            blocks,
            token_count,
            needs_summarization: false,
            pending_summarization: Vec::new(),
        }
    }
}

/// The system prompt block, truncated to its cap and the remaining budget.
fn system_block(system_prompt: &str, remaining: usize) -> ContextBlock {
    let cap = SYSTEM_PROMPT_CAP.min(remaining.saturating_sub(4));
    ContextBlock::new(Role::System, truncate_to_tokens(system_prompt, cap))
}

/// The delimiter-wrapped summary block, or `None` when no budget is left.
fn summary_block(summary: &str, remaining: usize) -> Option<ContextBlock> {
    // Reserve room for the delimiters and message overhead inside the cap.
    let cap = SUMMARY_CAP.min(remaining.saturating_sub(16));
    if cap == 0 {
        return None;
    }
    let body = truncate_to_tokens(summary, cap);
    if body.is_empty() {
        return None;
    }
    Some(ContextBlock::new(
        Role::System,
        format!("{SUMMARY_OPEN}\n{body}\n{SUMMARY_CLOSE}"),
    ))
}

/// Bullet-snippet block from retrieval hits, filled until the budget is
/// exhausted. `None` when nothing fits or there are no hits.
fn retrieval_block<'a>(
    snippets: impl Iterator<Item = &'a str>,
    budget: usize,
) -> Option<ContextBlock> {
    let mut used = estimate_tokens(RETRIEVAL_HEADER) + 4;
    if used >= budget {
        return None;
    }

    let mut lines: Vec<String> = Vec::new();
    for snippet in snippets {
        let line = format!("- {}", truncate_chars(snippet, SNIPPET_CHARS));
        let line_tokens = estimate_tokens(&line) + 1;
        if used + line_tokens > budget {
            break;
        }
        used += line_tokens;
        lines.push(line);
    }

    if lines.is_empty() {
        return None;
    }
    Some(ContextBlock::new(
        Role::System,
        format!("{RETRIEVAL_HEADER}\n{}", lines.join("\n")),
    ))
}

/// Verbatim recent messages, oldest-to-newest, within `budget`.
///
/// Fills from the newest backwards and stops at the first message that
/// does not fit, so exclusion is always monotonic with recency: dropping
/// a message also drops everything older than it.
fn recent_blocks(messages: &[Message], budget: usize) -> Vec<ContextBlock> {
    let mut used = 0usize;
    let mut included: Vec<&Message> = Vec::new();

    for msg in messages.iter().rev() {
        if msg.role == Role::System {
            continue;
        }
        let tokens = estimate_message_tokens(msg);
        if used + tokens > budget {
            break;
        }
        used += tokens;
        included.push(msg);
    }

    included.reverse();
    included
        .into_iter()
        .map(|m| ContextBlock::new(m.role, m.content.clone()).with_images(m.images.clone()))
        .collect()
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::SUMMARIZE_THRESHOLD;
    use boundless_core::error::MemoryError;
    use boundless_core::memory::{ConversationSummary, Embedder};
    use boundless_memory::EmbedderHandle;
    use boundless_storage::SqliteStore;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Embedder for StubEmbedder {
        fn id(&self) -> &str {
            "stub"
        }
        fn dimensions(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = text.as_bytes();
            let first = *bytes.first().unwrap_or(&0) as f32;
            Ok(vec![first, bytes.len() as f32, 1.0])
        }
    }

    async fn test_setup() -> (ContextAssembler, Arc<SemanticMemory>, Arc<AtomicUsize>) {
        let storage = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let factory_calls = calls.clone();
        let handle = EmbedderHandle::new(Box::new(move || {
            let calls = factory_calls.clone();
            Box::pin(async move {
                Ok(Arc::new(StubEmbedder { calls }) as Arc<dyn Embedder>)
            })
        }));
        let memory = Arc::new(SemanticMemory::new(storage, handle, true));
        (ContextAssembler::new(memory.clone()), memory, calls)
    }

    fn turns(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question number {i} about a running topic"))
                } else {
                    Message::assistant(format!("answer number {i} with some detail in it"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn token_count_stays_under_reserve_subtracted_limit() {
        let (assembler, _, _) = test_setup().await;
        // gpt-4 has the tightest known limit: 8192 − 4000 = 4192 working.
        let big: Vec<Message> = (0..50)
            .map(|i| Message::user(format!("{i} {}", "long filler text ".repeat(100))))
            .collect();

        let ctx = assembler
            .assemble("conv", &big, "You are helpful.", "gpt-4-0613")
            .await
            .unwrap();

        assert!(ctx.token_count <= 8_192 - RESPONSE_RESERVE);
    }

    #[tokio::test]
    async fn short_conversation_skips_summarization_and_retrieval() {
        let (assembler, _, calls) = test_setup().await;
        let messages = turns(RECENT_WINDOW);

        let ctx = assembler
            .assemble("conv", &messages, "You are helpful.", "gpt-4o")
            .await
            .unwrap();

        assert!(!ctx.needs_summarization);
        assert!(ctx.pending_summarization.is_empty());
        // Retrieval was never attempted: the embedding model is untouched.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn system_prompt_always_included_and_truncated() {
        let (assembler, _, _) = test_setup().await;
        let huge_prompt = "instruction ".repeat(1000);

        let ctx = assembler
            .assemble("conv", &[], &huge_prompt, "gpt-4o")
            .await
            .unwrap();

        assert_eq!(ctx.blocks.len(), 1);
        assert_eq!(ctx.blocks[0].role, Role::System);
        assert!(estimate_tokens(&ctx.blocks[0].content) <= SYSTEM_PROMPT_CAP);
    }

    #[tokio::test]
    async fn empty_system_prompt_is_omitted() {
        let (assembler, _, _) = test_setup().await;
        let ctx = assembler.assemble("conv", &[], "", "gpt-4o").await.unwrap();
        assert!(ctx.blocks.is_empty());
        assert_eq!(ctx.token_count, 0);
    }

    #[tokio::test]
    async fn summary_is_wrapped_in_delimiters() {
        let (assembler, memory, _) = test_setup().await;
        memory
            .save_summary(&ConversationSummary {
                conversation_id: "conv".into(),
                summary: "Earlier they discussed tide charts.".into(),
                summarized_up_to: Utc::now(),
                token_count: 9,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let ctx = assembler
            .assemble("conv", &turns(4), "sys", "gpt-4o")
            .await
            .unwrap();

        let summary_block = ctx
            .blocks
            .iter()
            .find(|b| b.content.contains("tide charts"))
            .unwrap();
        assert!(summary_block.content.starts_with(SUMMARY_OPEN));
        assert!(summary_block.content.ends_with(SUMMARY_CLOSE));
    }

    #[tokio::test]
    async fn retrieval_injects_older_snippets() {
        let (assembler, memory, _) = test_setup().await;
        let messages = turns(20);

        // Embed some older messages so retrieval has something to find.
        for msg in &messages[..10] {
            memory.store("conv", msg).await.unwrap();
        }

        let ctx = assembler
            .assemble("conv", &messages, "sys", "gpt-4o")
            .await
            .unwrap();

        let rag = ctx
            .blocks
            .iter()
            .find(|b| b.content.starts_with(RETRIEVAL_HEADER));
        assert!(rag.is_some());
        assert!(rag.unwrap().content.contains("- "));
    }

    #[tokio::test]
    async fn retrieval_failure_never_blocks_assembly() {
        let storage = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let handle = EmbedderHandle::new(Box::new(|| {
            Box::pin(async { Err(MemoryError::ModelUnavailable("down".into())) })
        }));
        let memory = Arc::new(SemanticMemory::new(storage, handle, true));
        let assembler = ContextAssembler::new(memory);

        let ctx = assembler
            .assemble("conv", &turns(20), "sys", "gpt-4o")
            .await
            .unwrap();

        // No retrieval block, but assembly succeeded with recent turns.
        assert!(!ctx.blocks.iter().any(|b| b.content.starts_with(RETRIEVAL_HEADER)));
        assert!(ctx.blocks.len() > 1);
    }

    #[tokio::test]
    async fn recent_exclusion_drops_oldest_first() {
        let messages = turns(RECENT_WINDOW);
        // Budget that fits roughly two messages.
        let two = estimate_message_tokens(&messages[4]) + estimate_message_tokens(&messages[5]);
        let blocks = recent_blocks(&messages, two);

        assert_eq!(blocks.len(), 2);
        // The two newest, in chronological order.
        assert_eq!(blocks[0].content, messages[4].content);
        assert_eq!(blocks[1].content, messages[5].content);
    }

    #[tokio::test]
    async fn recent_messages_come_oldest_to_newest() {
        let (assembler, _, _) = test_setup().await;
        let messages = turns(4);
        let ctx = assembler
            .assemble("conv", &messages, "", "gpt-4o")
            .await
            .unwrap();

        let contents: Vec<&str> = ctx.blocks.iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents.len(), 4);
        assert!(contents[0].contains("number 0"));
        assert!(contents[3].contains("number 3"));
    }

    #[tokio::test]
    async fn summarization_flag_returns_exactly_the_older_messages() {
        let (assembler, _, _) = test_setup().await;
        let messages = turns(RECENT_WINDOW + SUMMARIZE_THRESHOLD + 3);

        let ctx = assembler
            .assemble("conv", &messages, "sys", "gpt-4o")
            .await
            .unwrap();

        assert!(ctx.needs_summarization);
        assert_eq!(
            ctx.pending_summarization.len(),
            SUMMARIZE_THRESHOLD + 3
        );
        assert_eq!(ctx.pending_summarization[0].id, messages[0].id);
    }

    #[tokio::test]
    async fn existing_summary_suppresses_the_flag() {
        let (assembler, memory, _) = test_setup().await;
        memory
            .save_summary(&ConversationSummary {
                conversation_id: "conv".into(),
                summary: "covered already".into(),
                summarized_up_to: Utc::now(),
                token_count: 4,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let ctx = assembler
            .assemble("conv", &turns(40), "sys", "gpt-4o")
            .await
            .unwrap();
        assert!(!ctx.needs_summarization);
    }

    #[test]
    fn fallback_uses_the_reserve_subtracted_budget() {
        let big: Vec<Message> = (0..50)
            .map(|i| Message::user(format!("{i} {}", "filler words here ".repeat(100))))
            .collect();

        let ctx = ContextAssembler::assemble_minimal(&big, "sys", None, "gpt-4-0613");
        assert!(ctx.token_count <= 8_192 - RESPONSE_RESERVE);
        assert!(!ctx.needs_summarization);
    }

    #[test]
    fn fallback_includes_passed_in_summary() {
        let ctx = ContextAssembler::assemble_minimal(
            &turns(4),
            "sys",
            Some("they argued about maps"),
            "gpt-4o",
        );
        assert!(
            ctx.blocks
                .iter()
                .any(|b| b.content.contains("they argued about maps"))
        );
    }

    #[test]
    fn images_survive_into_recent_blocks() {
        let img = boundless_core::message::ImageRef {
            data: "aGVsbG8=".into(),
            media_type: "image/png".into(),
        };
        let messages = vec![Message::user_with_images(
            "what is in this picture exactly",
            vec![img],
        )];
        let blocks = recent_blocks(&messages, 1000);
        assert_eq!(blocks[0].images.len(), 1);
    }
}
