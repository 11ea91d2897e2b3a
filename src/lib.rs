//! # Nuzantara Core
//!
//! An agentic RAG orchestrator for business queries (visa, tax, company
//! setup, legal) against local OpenAI-compatible LLM servers such as:
//! - LM Studio
//! - Ollama
//! - llama.cpp
//! - vLLM
//!
//! ## Architecture
//!
//! The crate is organized around the eight components of the orchestrator:
//!
//! - **gateway**: streaming request/response surface (C1), axum + SSE.
//! - **router**: query-tier classification and collection selection (C2).
//! - **memory**: per-session conversation history and entity memory (C3).
//! - **orchestrator**: the ReAct tool-calling loop and turn lifecycle (C4).
//! - **tools**: tool registry, executor, and the five built-in tools (C5).
//! - **retrieval**: hybrid retrieval pipeline and semantic cache (C6).
//! - **llm**: tier-aware provider fallback cascade (C7).
//! - **evidence**: citation binding, format templates, PII redaction,
//!   reasoning-leak filtering, and the verification score (C8).
//!
//! Supporting modules (`config`, `context`, `error`, `hooks`, `retry`,
//! `types`, `utils`) carry configuration, token budgeting, error handling,
//! tool audit hooks, retry/backoff, the shared data model, and SSE/hashing
//! utilities respectively.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Configuration surface: collections, router, orchestrator, LLM provider
/// cascades, retrieval, memory, PII, and limits.
pub mod config;

/// Context window management: token estimation and history truncation,
/// entity- and summary-aware (C4/C7 token budgeting).
pub mod context;

/// Error types and conversions used across the crate's public APIs.
mod error;

/// Lifecycle hooks for tool invocation (C5 pre/post-tool-use audit points).
mod hooks;

/// Tool definition, registry, and execution system (C5).
pub mod tools;

/// Core data model: principals, sessions, messages, queries, route
/// decisions, retrieval results, evidence packs, tool invocations.
pub mod types;

/// Internal utilities for SSE chunk aggregation and query fingerprinting.
pub mod utils;

/// Conversation memory: session store and entity extraction/merge (C3).
pub mod memory;

/// Query router: tier classification and collection selection (C2).
pub mod router;

/// Hybrid retrieval pipeline and semantic cache (C6).
pub mod retrieval;

/// Tier-aware LLM provider fallback cascade (C7).
pub mod llm;

/// Evidence and output pipeline: citation binding, format templates, PII
/// redaction, reasoning-leak filtering, verification score (C8).
pub mod evidence;

/// Agentic orchestrator: the ReAct loop and turn lifecycle (C4).
pub mod orchestrator;

/// Request Gateway: axum SSE service (C1).
pub mod gateway;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

/// Retry utilities with exponential backoff and jitter, used by the LLM
/// Gateway's provider cascade and the retrieval pipeline's transient-error
/// handling.
pub mod retry;

// --- Error Handling ---

pub use error::{Error, Result};

// --- Lifecycle Hooks ---

pub use hooks::{
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT, HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, tool};

// --- Core Types ---

pub use types::{
    Chunk, ChunkMetadata, Citation, EvidencePack, Message, MessageRole, ParentDocument, Principal, Query, RouteDecision, ScoredChunk, SessionId,
    Tier, ToolInvocation, ToolOutcome,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module re-exporting the most commonly used types across the
/// orchestrator. Import with `use nuzantara_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Chunk, Citation, Error, EvidencePack, HookDecision, Hooks, Message, MessageRole, ParentDocument, PostToolUseEvent, PreToolUseEvent,
        Principal, Query, Result, RouteDecision, ScoredChunk, SessionId, Tier, Tool, ToolInvocation, ToolOutcome, tool,
    };
}
