//! Core data model.
//!
//! Types here are intentionally plain: validation lives at construction
//! (the few places that must never hold an invalid value, e.g. `SessionId`)
//! and everything else is a `serde`-friendly struct so it can cross the
//! gateway's wire boundary without a second parallel DTO layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Opaque caller identity. The core never interprets `role` beyond passing
/// it to collection-authorization checks; it does not design the auth
/// primitive itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Option<String>) -> Self {
        Self { id: id.into(), role }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// Opaque session identifier. Session ids are supplied by the gateway; the
/// core never invents one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::validation("session_id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(session_id, principal_id, created_at)`. A session owns an
/// ordered, append-only list of messages; ownership and isolation
/// invariants are enforced by `memory::SessionStore`, not by
/// this struct itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub principal_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Role of a persisted conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// `(role, content, timestamp, optional sources, optional tool_name,
/// optional tool_args, optional tool_result)`. Created by the
/// orchestrator or gateway each turn, persisted after turn completion,
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<serde_json::Value>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            sources: None,
            tool_name: None,
            tool_args: None,
            tool_result: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Citation>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            sources: if sources.is_empty() { None } else { Some(sources) },
            tool_name: None,
            tool_args: None,
            tool_result: None,
        }
    }

    pub fn tool(
        tool_name: impl Into<String>,
        tool_args: serde_json::Value,
        tool_result: serde_json::Value,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: String::new(),
            timestamp: chrono::Utc::now(),
            sources: None,
            tool_name: Some(tool_name.into()),
            tool_args: Some(tool_args),
            tool_result: Some(tool_result),
        }
    }
}

/// Recognized entity kinds (minimum set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Name,
    Location,
    Budget,
    Profession,
    PreferredLanguage,
    ExpertiseLevel,
}

/// Extracted fact bound to a session. Most recent value per
/// `kind` wins; never shared across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
    pub confidence: f32,
    pub turn_index: u32,
}

/// Snapshot of all entities pinned to a session, keyed by kind.
pub type EntitySnapshot = HashMap<EntityKind, Entity>;

/// Detected natural language of a user message (Italian/English/Indonesian
/// minimum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Italian,
    English,
    Indonesian,
    Other,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Italian => "it",
            Language::English => "en",
            Language::Indonesian => "id",
            Language::Other => "und",
        }
    }
}

/// `(text, session_id, principal_id, conversation_history_prefix, hints)`.
/// Ephemeral; constructed per request.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub session_id: SessionId,
    pub principal: Principal,
    pub history_prefix: Vec<Message>,
    pub hints: serde_json::Value,
}

/// Coarse classification of query difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Greeting,
    Fast,
    Pro,
    Deep,
}

impl Tier {
    /// Default iteration cap per tier (overridable via
    /// `orchestrator.max_iterations_per_tier` configuration).
    pub fn default_max_iterations(&self) -> u32 {
        match self {
            Tier::Greeting => 0,
            Tier::Fast => 2,
            Tier::Pro => 4,
            Tier::Deep => 6,
        }
    }
}

/// `(tier, collections, tools_enabled, max_iterations, model_tier)`.
/// Produced by the Query Router per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub tier: Tier,
    pub collections: Vec<String>,
    pub tools_enabled: bool,
    pub max_iterations: u32,
    pub model_tier: Tier,
}

/// Read-only chunk metadata, owned by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub hierarchy_path: Vec<String>,
    pub ordering_keys: Vec<i64>,
    pub quality_flags: Vec<String>,
}

/// `(chunk_id, parent_id, text, embedding_vector, metadata)`. `chunk_id` is
/// a deterministic function of semantic identity so re-ingesting the same
/// logical chunk yields the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub parent_id: String,
    pub text: String,
    #[serde(default)]
    pub embedding_vector: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub collection: String,
}

/// Coarse-grained context unit addressed by `parent_id`. Every chunk names
/// exactly one canonical parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentDocument {
    pub parent_id: String,
    pub title: String,
    pub full_text: String,
    pub metadata: serde_json::Value,
    pub is_canonical: bool,
}

/// One scored candidate from a retrieval pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub relevance_score: f32,
    pub rerank_score: Option<f32>,
}

/// Ordered retrieval result plus optional expanded parent texts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub results: Vec<ScoredChunk>,
    pub expanded_parents: Vec<ParentDocument>,
    /// True if this result was served from the semantic cache.
    pub from_cache: bool,
}

/// Citation produced by the evidence pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub parent_id: String,
}

/// `(answer_text, citations, verification_score, format_template?)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePack {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    pub verification_score: f32,
    pub format_template: Option<String>,
}

/// Outcome of a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Ok,
    Error,
    Timeout,
}

/// `(name, args_json, started_at, finished_at, outcome, result_or_error)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub args_json: serde_json::Value,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub outcome: ToolOutcome,
    pub result_or_error: serde_json::Value,
}

/// `(query_fingerprint, route_decision, answer, citations, stored_at, ttl)`.
/// Keyed by a normalized fingerprint, not raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheEntry {
    pub query_fingerprint: String,
    pub route_decision: RouteDecision,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub stored_at: chrono::DateTime<chrono::Utc>,
    pub ttl_secs: u64,
}
