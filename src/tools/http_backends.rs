//! Backend implementations for the business-data tools (pricing, team,
//! vision) and the retrieval adapter for `vector_search`'s catalogue entry.
//!
//! Follows `retrieval::http`'s `reqwest` client pattern: a single
//! `reqwest::Client` handed in by the bootstrap, JSON in, JSON out,
//! `Error::retrieval_transient`-style mapping for transport failures. Pricing
//! and team lookups fall back to a small static catalog when no service URL
//! is configured, so the binary is still useful without external business
//! systems wired up.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::builtin::{PricingBackend, TeamBackend, VectorSearchBackend, VisionBackend};
use crate::retrieval::RetrievalPipeline;
use crate::types::{Principal, Query, RouteDecision, Tier};
use crate::{Error, Result};

/// Adapts the full C6 pipeline to the catalogue-only `vector_search` tool
/// entry. The orchestrator special-cases `vector_search` and calls
/// `RetrievalPipeline` directly for structured citation binding, so this
/// adapter's `search` is only reached if a model somehow dispatches the tool
/// outside the orchestrator's own loop (it never does in normal operation).
pub struct RetrievalSearchBackend {
    pipeline: Arc<RetrievalPipeline>,
}

impl RetrievalSearchBackend {
    pub fn new(pipeline: Arc<RetrievalPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl VectorSearchBackend for RetrievalSearchBackend {
    async fn search(&self, query: &str, collections: Vec<String>, k: usize) -> Result<Value> {
        let principal = Principal::new("tool-dispatch", None);
        let route = RouteDecision { tier: Tier::Pro, collections, tools_enabled: true, max_iterations: 0, model_tier: Tier::Pro };
        let result = self.pipeline.retrieve(query, "en", &principal, &route).await?;
        Ok(json!({
            "query": query,
            "k": k,
            "results": result.expanded_parents.iter().map(|p| json!({
                "parent_id": p.parent_id,
                "excerpt": p.full_text.chars().take(280).collect::<String>(),
            })).collect::<Vec<_>>(),
        }))
    }
}

#[derive(Clone)]
pub struct HttpPricingBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPricingBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl PricingBackend for HttpPricingBackend {
    async fn lookup(&self, service_key: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/pricing/{}", self.base_url, service_key))
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("pricing service request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::tool(format!("pricing service returned {}", response.status())));
        }
        response.json().await.map_err(|e| Error::retrieval_transient(format!("pricing service response malformed: {e}")))
    }
}

/// Small fixed catalog of Bali Zero's common service offerings, used when no
/// `pricing_service_url` is configured.
pub struct StaticPricingBackend {
    catalog: Vec<(&'static str, u64)>,
}

impl StaticPricingBackend {
    pub fn new() -> Self {
        Self {
            catalog: vec![
                ("kitas_working", 12_000_000),
                ("kitas_investor", 17_000_000),
                ("pt_pma_setup", 25_000_000),
                ("npwp_registration", 1_500_000),
                ("tax_report_annual", 3_000_000),
            ],
        }
    }
}

impl Default for StaticPricingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PricingBackend for StaticPricingBackend {
    async fn lookup(&self, service_key: &str) -> Result<Value> {
        self.catalog
            .iter()
            .find(|(key, _)| *key == service_key)
            .map(|(key, price)| json!({"service_key": key, "price_idr": price, "source": "static_catalog"}))
            .ok_or_else(|| Error::tool(format!("unknown service_key: {service_key}")))
    }
}

#[derive(Clone)]
pub struct HttpTeamBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTeamBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl TeamBackend for HttpTeamBackend {
    async fn lookup(&self, criteria: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/team/search", self.base_url))
            .query(&[("q", criteria)])
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("team service request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::tool(format!("team service returned {}", response.status())));
        }
        response.json().await.map_err(|e| Error::retrieval_transient(format!("team service response malformed: {e}")))
    }
}

/// Small fixed roster used when no `team_service_url` is configured.
pub struct StaticTeamBackend {
    roster: Vec<(&'static str, &'static str, &'static str)>,
}

impl StaticTeamBackend {
    pub fn new() -> Self {
        Self {
            roster: vec![
                ("Amanda", "visa consultant", "english, indonesian"),
                ("Dewi", "tax consultant", "indonesian, english"),
                ("Marco", "legal consultant", "italian, english"),
                ("Rina", "company setup specialist", "indonesian, english, mandarin"),
            ],
        }
    }
}

impl Default for StaticTeamBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamBackend for StaticTeamBackend {
    async fn lookup(&self, criteria: &str) -> Result<Value> {
        let needle = criteria.to_lowercase();
        let matches: Vec<Value> = self
            .roster
            .iter()
            .filter(|(name, role, languages)| {
                name.to_lowercase().contains(&needle) || role.to_lowercase().contains(&needle) || languages.to_lowercase().contains(&needle)
            })
            .map(|(name, role, languages)| json!({"name": name, "role": role, "languages": languages}))
            .collect();
        Ok(json!({"criteria": criteria, "matches": matches, "source": "static_roster"}))
    }
}

#[derive(Clone)]
pub struct HttpVisionBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVisionBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn analyze(&self, uri: &str, question: Option<&str>) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&json!({"uri": uri, "question": question}))
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("vision service request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::tool(format!("vision service returned {}", response.status())));
        }
        response.json().await.map_err(|e| Error::retrieval_transient(format!("vision service response malformed: {e}")))
    }
}

/// Used when no `vision_service_url` is configured. `vision_analyze` is a
/// required tool so it must stay registered even without a multimodal
/// backend wired up; it fails clearly rather than being silently absent
/// from the catalogue.
#[derive(Default)]
pub struct UnconfiguredVisionBackend;

#[async_trait]
impl VisionBackend for UnconfiguredVisionBackend {
    async fn analyze(&self, _uri: &str, _question: Option<&str>) -> Result<Value> {
        Err(Error::tool("vision_analyze: no vision_service_url configured"))
    }
}
