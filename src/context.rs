//! Token budgeting for the LLM Gateway.
//!
//! Before each call, available context = `model_limit - reserved_output -
//! system_prompt_size`, and the history block is truncated to fit,
//! preferring the most recent turns and the entity snapshot; any
//! precomputed summarized preamble is always preserved.

use crate::types::{Entity, EntityKind, Message};
use std::collections::HashMap;

/// Character-based token approximation (1 token ≈ 4 characters). Actual
/// counts vary by model family; callers should keep a 10-20% safety margin.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0usize;
    for message in messages {
        total_chars += 8; // role formatting overhead
        total_chars += message.content.len();
        if let Some(args) = &message.tool_args {
            total_chars += args.to_string().len();
        }
        if let Some(result) = &message.tool_result {
            total_chars += result.to_string().len();
        }
    }
    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4
}

pub fn estimate_text_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

/// Truncate message history, keeping the most recent `keep` messages plus
/// any pinned `summary_preamble`. Does not attempt to preserve tool call
/// chains; callers needing that should truncate at a natural breakpoint.
pub fn truncate_messages(
    messages: &[Message],
    keep: usize,
    summary_preamble: Option<&str>,
) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let recent: Vec<Message> = if messages.len() <= keep {
        messages.to_vec()
    } else if keep == 0 {
        Vec::new()
    } else {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    };

    match summary_preamble {
        Some(preamble) if !preamble.is_empty() => {
            let mut result = vec![Message::assistant(preamble.to_string(), vec![])];
            result.extend(recent);
            result
        }
        _ => recent,
    }
}

pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

/// Compute the character budget available to the history block for a single
/// generation call: `model_limit - reserved_output - system_prompt - entity_snapshot`.
pub fn available_history_tokens(
    model_limit_tokens: usize,
    reserved_output_tokens: usize,
    system_prompt: &str,
    entities: &HashMap<EntityKind, Entity>,
) -> usize {
    let system_tokens = estimate_text_tokens(system_prompt);
    let entity_tokens: usize = entities
        .values()
        .map(|e| estimate_text_tokens(&e.value) + 2)
        .sum();

    model_limit_tokens
        .saturating_sub(reserved_output_tokens)
        .saturating_sub(system_tokens)
        .saturating_sub(entity_tokens)
}
