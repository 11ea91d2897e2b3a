//! Streaming utilities: SSE parsing and tool-call delta aggregation for the
//! LLM Gateway (C7), plus the semantic-cache fingerprint helper used by the
//! Retrieval Pipeline's cache-probe stage (C6).
//!
//! The OpenAI-compatible chat-completions streaming format sends tool calls
//! as incremental deltas across many chunks:
//!
//! ```text
//! data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"vector_search"}}]}}]}
//! data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q"}}]}}}]}
//! data: {"choices":[{"delta":{}, "finish_reason":"tool_calls"}]}
//! data: [DONE]
//! ```
//!
//! [`ToolCallAggregator`] accumulates these deltas and only emits a
//! completed [`LlmOutputBlock`] once a `finish_reason` closes the chunk.

use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::pin::Pin;

// ============================================================================
// OpenAI-compatible wire format (LLM Gateway transport, not the core data model)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChunk {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub call_type: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub temperature: f32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
}

/// A completed block of model output, assembled from streaming deltas.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutputBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Stateful accumulator turning a stream of [`OpenAIChunk`]s into completed
/// [`LlmOutputBlock`]s, flushed only when a chunk's `finish_reason` is set.
#[derive(Default)]
pub struct ToolCallAggregator {
    text_buffer: String,
    tool_calls: HashMap<u32, PartialToolCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_chunk(&mut self, chunk: OpenAIChunk) -> Result<Vec<LlmOutputBlock>> {
        let mut blocks = Vec::new();

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.text_buffer.push_str(&content);
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for tool_call in tool_calls {
                    let entry = self.tool_calls.entry(tool_call.index).or_default();
                    if let Some(id) = tool_call.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = tool_call.function {
                        if let Some(name) = function.name {
                            entry.name = Some(name);
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }

            if choice.finish_reason.is_some() {
                if !self.text_buffer.is_empty() {
                    blocks.push(LlmOutputBlock::Text(self.text_buffer.clone()));
                    self.text_buffer.clear();
                }

                for (_, partial) in self.tool_calls.drain() {
                    if let (Some(id), Some(name)) = (partial.id, partial.name) {
                        let input: serde_json::Value = if partial.arguments.is_empty() {
                            serde_json::json!({})
                        } else {
                            serde_json::from_str(&partial.arguments).map_err(|e| {
                                Error::stream(format!("Failed to parse tool arguments: {}", e))
                            })?
                        };
                        blocks.push(LlmOutputBlock::ToolUse { id, name, input });
                    }
                }
            }
        }

        Ok(blocks)
    }
}

/// Parses a raw HTTP response body as an SSE stream of [`OpenAIChunk`]s.
/// Errors are per-chunk, not fatal to the stream.
pub fn parse_sse_stream(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>> {
    let stream = body.bytes_stream().filter_map(move |result| async move {
        let bytes = match result.map_err(Error::Http) {
            Ok(b) => b,
            Err(e) => return Some(Err(e)),
        };

        let text = String::from_utf8_lossy(&bytes);

        for line in text.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" {
                    continue;
                }

                let chunk: OpenAIChunk = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => {
                        return Some(Err(Error::stream(format!("Failed to parse chunk: {}", e))));
                    }
                };

                return Some(Ok(chunk));
            }
        }

        None
    });

    Box::pin(stream)
}

/// Normalizes query text for fingerprinting: lowercase, strip punctuation,
/// collapse whitespace.
pub fn normalize_query(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped: String = lower
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stopword-overlap language detection across the three minimum supported
/// languages (Italian, English, Indonesian). Cheap and good enough for
/// routing a language directive into the system prompt; not intended as a
/// general-purpose language identifier.
pub fn detect_language(text: &str) -> crate::types::Language {
    const ITALIAN_STOPWORDS: &[&str] = &["ciao", "grazie", "voglio", "sono", "come", "cosa", "perché", "anzi", "il", "la", "di", "per"];
    const INDONESIAN_STOPWORDS: &[&str] = &["saya", "bagaimana", "apa", "yang", "dengan", "untuk", "terima", "kasih", "adalah"];
    const ENGLISH_STOPWORDS: &[&str] = &["the", "what", "how", "is", "are", "do", "does", "please", "need", "thanks"];

    let normalized = normalize_query(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return crate::types::Language::Other;
    }

    let score = |stopwords: &[&str]| words.iter().filter(|w| stopwords.contains(w)).count();
    let (italian, indonesian, english) = (score(ITALIAN_STOPWORDS), score(INDONESIAN_STOPWORDS), score(ENGLISH_STOPWORDS));

    if italian == 0 && indonesian == 0 && english == 0 {
        return crate::types::Language::Other;
    }
    if italian >= indonesian && italian >= english {
        crate::types::Language::Italian
    } else if indonesian >= english {
        crate::types::Language::Indonesian
    } else {
        crate::types::Language::English
    }
}

/// Stable fingerprint of normalized query text + route context, used as the
/// semantic cache key (`SemanticCacheEntry::query_fingerprint`).
pub fn fingerprint_query(text: &str, language: &str, collections: &[String]) -> String {
    let normalized = normalize_query(text);
    let mut sorted_collections = collections.to_vec();
    sorted_collections.sort();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(language.as_bytes());
    hasher.update(b"|");
    hasher.update(sorted_collections.join(",").as_bytes());

    format!("{:x}", hasher.finalize())
}
