//! The five required tools: `vector_search`, `pricing_lookup`,
//! `team_lookup`, `diagnostics`, `vision_analyze`.
//!
//! Each constructor takes an injected backend trait object rather than a
//! concrete retrieval/vision client, so this module has no dependency on
//! `crate::retrieval` or `crate::llm` — the registry is assembled once at
//! startup (in the binary's bootstrap) by handing each tool its backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{tool, Tool};
use crate::{Error, Result};

/// Backs `vector_search`. Implemented by `retrieval::RetrievalPipeline`.
#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    async fn search(&self, query: &str, collections: Vec<String>, k: usize) -> Result<Value>;
}

/// Backs `pricing_lookup`. A small, deterministic catalog is enough here —
/// this is business data, not a retrieval concern.
#[async_trait]
pub trait PricingBackend: Send + Sync {
    async fn lookup(&self, service_key: &str) -> Result<Value>;
}

/// Backs `team_lookup`.
#[async_trait]
pub trait TeamBackend: Send + Sync {
    async fn lookup(&self, criteria: &str) -> Result<Value>;
}

/// Backs `vision_analyze`. Implemented by an LLM Gateway multimodal call.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn analyze(&self, uri: &str, question: Option<&str>) -> Result<Value>;
}

/// `vector_search(query, collections, k)` — dispatches into the Retrieval
/// Pipeline (C6). Collection authorization is enforced by the backend, not
/// here: the tool layer only validates shape.
pub fn vector_search_tool(backend: Arc<dyn VectorSearchBackend>) -> Tool {
    tool(
        "vector_search",
        "Search the knowledge base for passages relevant to a query, optionally scoped to specific collections.",
    )
    .schema(json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Natural-language search query"},
            "collections": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Collection names to search (e.g. visa, tax, legal)"
            },
            "k": {"type": "integer", "description": "Number of results to return", "default": 8}
        },
        "required": ["query"]
    }))
    .timeout(Duration::from_secs(8))
    .idempotent(true)
    .build(move |args| {
        let backend = backend.clone();
        async move {
            let query = args
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::tool("vector_search: missing 'query'"))?
                .to_string();
            let collections = args
                .get("collections")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let k = args.get("k").and_then(Value::as_u64).unwrap_or(8) as usize;

            backend.search(&query, collections, k).await
        }
    })
}

/// `pricing_lookup(service_key)` — returns the price/terms for a named
/// service offering.
pub fn pricing_lookup_tool(backend: Arc<dyn PricingBackend>) -> Tool {
    tool("pricing_lookup", "Look up current pricing for a named service offering.")
        .schema(json!({
            "type": "object",
            "properties": {
                "service_key": {"type": "string", "description": "Service identifier, e.g. 'kitas_working', 'pt_pma_setup'"}
            },
            "required": ["service_key"]
        }))
        .timeout(Duration::from_secs(3))
        .idempotent(true)
        .build(move |args| {
            let backend = backend.clone();
            async move {
                let service_key = args
                    .get("service_key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::tool("pricing_lookup: missing 'service_key'"))?;
                backend.lookup(service_key).await
            }
        })
}

/// `team_lookup(criteria)` — finds a team member or department matching a
/// free-form criteria string (e.g. "tax consultant speaking Italian").
pub fn team_lookup_tool(backend: Arc<dyn TeamBackend>) -> Tool {
    tool("team_lookup", "Find a team member or department matching the given criteria.")
        .schema(json!({
            "type": "object",
            "properties": {
                "criteria": {"type": "string", "description": "Free-form search criteria, e.g. role, specialty, or language"}
            },
            "required": ["criteria"]
        }))
        .timeout(Duration::from_secs(3))
        .idempotent(true)
        .build(move |args| {
            let backend = backend.clone();
            async move {
                let criteria = args
                    .get("criteria")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::tool("team_lookup: missing 'criteria'"))?;
                backend.lookup(criteria).await
            }
        })
}

/// `diagnostics()` — self-contained health snapshot exposed as a tool so a
/// model can answer "are you working correctly" questions during a turn. No
/// backend needed; this is simply the registry reporting on itself.
pub fn diagnostics_tool(registry_names: Arc<Vec<String>>, started_at: chrono::DateTime<chrono::Utc>) -> Tool {
    tool("diagnostics", "Report orchestrator health: uptime and registered tool names.")
        .schema(json!({"type": "object", "properties": {}}))
        .timeout(Duration::from_millis(200))
        .idempotent(true)
        .build(move |_args| {
            let registry_names = registry_names.clone();
            async move {
                let uptime_secs = (chrono::Utc::now() - started_at).num_seconds().max(0);
                Ok(json!({
                    "status": "ok",
                    "uptime_secs": uptime_secs,
                    "registered_tools": registry_names.as_slice(),
                }))
            }
        })
}

/// `vision_analyze(uri)` — routes an image URI (plus optional question) to a
/// multimodal model call. Longer default timeout: vision calls are the
/// slowest tool in practice.
pub fn vision_analyze_tool(backend: Arc<dyn VisionBackend>) -> Tool {
    tool("vision_analyze", "Analyze an image (e.g. a scanned document or photo) and answer a question about it.")
        .schema(json!({
            "type": "object",
            "properties": {
                "uri": {"type": "string", "description": "HTTP(S) URI or data URI of the image"},
                "question": {"type": "string", "description": "Optional question to focus the analysis"}
            },
            "required": ["uri"]
        }))
        .timeout(Duration::from_secs(25))
        .idempotent(true)
        .build(move |args| {
            let backend = backend.clone();
            async move {
                let uri = args
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::tool("vision_analyze: missing 'uri'"))?;
                let question = args.get("question").and_then(Value::as_str);
                backend.analyze(uri, question).await
            }
        })
}
