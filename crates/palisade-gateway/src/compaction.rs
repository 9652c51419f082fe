//! Conversation compaction.
//!
//! When a session approaches its model's context limit, older messages are
//! summarized into a single system message so the session can continue
//! without losing continuity. Token estimation is intentionally rough
//! (4 chars per token) - accurate enough to trigger at the right time
//! without a tokenizer dependency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Trigger compaction when this fraction of the context window is used.
const COMPACT_THRESHOLD: f64 = 0.78;

/// Always keep the most recent N messages uncompacted.
const KEEP_LAST_N: usize = 4;

/// Conservative fallback for unknown models.
const DEFAULT_CONTEXT_LIMIT: usize = 32_000;

/// Sampling temperature for the summarization call.
const SUMMARY_TEMPERATURE: f32 = 0.3;

/// Output budget for the summary.
const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Context window sizes, listed conservatively: actual limits are higher
/// but headroom is needed for the system prompt and the reply.
const CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("gpt-3.5-turbo", 16_385),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4.1-mini", 128_000),
    ("gpt-4.1", 128_000),
    ("gpt-4", 8_192),
    ("o1-mini", 128_000),
    ("o1", 200_000),
    ("o3-mini", 200_000),
    ("claude-3-haiku", 200_000),
    ("claude-3-sonnet", 200_000),
    ("claude-3-opus", 200_000),
    ("claude-sonnet-4", 200_000),
    ("gemini-1.5-pro", 1_000_000),
    ("gemini-pro", 32_000),
    ("mistral-7b-instruct", 32_000),
    ("mistral", 32_000),
    ("llama3", 8_192),
];

const SUMMARY_SYSTEM_PROMPT: &str = "\
You are a conversation compactor.
Summarize the following chat history into a concise block that preserves:
- All concrete facts, decisions, and outcomes
- Any code snippets or technical details that were produced
- The user's goals and the assistant's conclusions

Output ONLY the summary - no preamble, no \"Here is a summary:\" prefix.
Be thorough but terse. Bullet points are fine.
";

/// One chat message in a session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role (`user`, `assistant`, `system`).
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Seam to the LLM provider layer (out of scope for the gateway core).
#[async_trait]
pub trait CompletionAdapter: Send + Sync {
    /// Run one completion and return the text.
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
        model: Option<&str>,
    ) -> GatewayResult<String>;
}

/// Rough token count for a text: 4 chars per token, at least 1.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

/// Estimated total tokens for a message list, including per-message
/// formatting overhead.
#[must_use]
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| 4 + estimate_tokens(&m.content))
        .sum()
}

/// Context window size for a model name.
///
/// Exact match first, then prefix/substring (so versioned ids like
/// `gpt-4o-mini-2024-07-18` resolve), else the conservative default.
#[must_use]
pub fn context_limit_for(model: &str) -> usize {
    let model = model.trim().to_lowercase();
    if model.is_empty() {
        return DEFAULT_CONTEXT_LIMIT;
    }
    if let Some((_, limit)) = CONTEXT_LIMITS.iter().find(|(name, _)| *name == model) {
        return *limit;
    }
    for (name, limit) in CONTEXT_LIMITS {
        if model.starts_with(name) || model.contains(name) {
            return *limit;
        }
    }
    DEFAULT_CONTEXT_LIMIT
}

/// Fraction (0..) of the context window currently used.
#[must_use]
pub fn usage_fraction(messages: &[ChatMessage], model: &str) -> f64 {
    estimate_messages_tokens(messages) as f64 / context_limit_for(model) as f64
}

/// Whether the conversation should be compacted now.
#[must_use]
pub fn needs_compaction(messages: &[ChatMessage], model: &str) -> bool {
    usage_fraction(messages, model) >= COMPACT_THRESHOLD
}

/// Summarize older messages into one system message.
///
/// The last [`KEEP_LAST_N`] messages are kept verbatim; everything before
/// them is replaced with the adapter-produced summary. Returns the
/// compacted list, the raw summary text and the estimated tokens saved.
pub async fn compact_messages(
    messages: &[ChatMessage],
    adapter: &dyn CompletionAdapter,
    model: Option<&str>,
) -> GatewayResult<(Vec<ChatMessage>, String, usize)> {
    if messages.len() <= KEEP_LAST_N + 1 {
        return Ok((messages.to_vec(), String::new(), 0));
    }

    let split = messages.len() - KEEP_LAST_N;
    let (to_compact, to_keep) = messages.split_at(split);

    let history_text = to_compact
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let summary = adapter
        .complete(
            SUMMARY_SYSTEM_PROMPT,
            &history_text,
            SUMMARY_TEMPERATURE,
            SUMMARY_MAX_TOKENS,
            model,
        )
        .await?;
    let summary = summary.trim().to_string();
    if summary.is_empty() {
        return Err(GatewayError::Adapter(
            "summarizer returned empty output".to_string(),
        ));
    }

    let tokens_before = estimate_messages_tokens(messages);
    let summary_message = ChatMessage::new(
        "system",
        format!("[CONVERSATION SUMMARY — earlier messages compacted]\n\n{summary}"),
    );

    let mut compacted = Vec::with_capacity(KEEP_LAST_N + 1);
    compacted.push(summary_message);
    compacted.extend_from_slice(to_keep);

    let tokens_after = estimate_messages_tokens(&compacted);
    let tokens_saved = tokens_before.saturating_sub(tokens_after);

    tracing::info!(
        evicted = to_compact.len(),
        tokens_saved,
        "conversation compacted"
    );
    Ok((compacted, summary, tokens_saved))
}
