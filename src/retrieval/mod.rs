//! Retrieval Pipeline (C6): semantic cache probe → embed → vector search →
//! rerank → parent expansion → assemble.
//!
//! Every external dependency (vector store, embedding service, reranker,
//! parent-document store) is a trait so the pipeline can be exercised with
//! fakes in tests; `http.rs` carries the HTTP-client default implementations
//! used in production, following the same `reqwest`-based request pattern
//! used throughout the crate.

mod http;

use async_trait::async_trait;
use moka::future::Cache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::types::{Chunk, ParentDocument, Principal, RouteDecision, ScoredChunk, SemanticCacheEntry, Tier};
use crate::utils::fingerprint_query;
use crate::{Error, Result};

pub use http::{HttpEmbeddingService, HttpParentDocumentStore, HttpReranker, HttpVectorStore};

/// `k` used for a collection with no configured entry.
const DEFAULT_K: usize = 8;

/// `search(collection, vector, k, filter) → [{id, score, payload}]`.
/// `upsert` is intentionally not part of this trait: ingestion is external
/// to the core.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;
}

/// `embed(text[]) → vector[]`.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Cross-encoder reranker: reorders candidates against the original query.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>>;
}

/// `get_parent(parent_id) → {title, full_text, metadata, is_canonical}`.
/// Non-canonical rows must be filtered by the caller.
#[async_trait]
pub trait ParentDocumentStore: Send + Sync {
    async fn get_parent(&self, parent_id: &str) -> Result<ParentDocument>;
}

/// Six-stage retrieval pipeline. Holds the semantic cache itself (moka,
/// shared across requests with last-writer-wins semantics).
pub struct RetrievalPipeline {
    vector_store: Arc<dyn VectorStore>,
    embedding_service: Arc<dyn EmbeddingService>,
    reranker: Arc<dyn Reranker>,
    parent_store: Arc<dyn ParentDocumentStore>,
    cache: Cache<String, SemanticCacheEntry>,
    config: RetrievalConfig,
    collection_k: HashMap<String, usize>,
}

impl RetrievalPipeline {
    /// `collection_k` carries the per-collection `k` from each collection's
    /// config entry; a collection with no entry falls back to
    /// [`DEFAULT_K`].
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding_service: Arc<dyn EmbeddingService>,
        reranker: Arc<dyn Reranker>,
        parent_store: Arc<dyn ParentDocumentStore>,
        config: RetrievalConfig,
        collection_k: HashMap<String, usize>,
    ) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .max_capacity(10_000)
            .build();

        Self { vector_store, embedding_service, reranker, parent_store, cache, config, collection_k }
    }

    /// Runs the full pipeline for a query already routed to a [`RouteDecision`].
    /// `principal` gates which collections are actually searched — collection
    /// authorization happens pre-search, never post-hoc.
    pub async fn retrieve(
        &self,
        query_text: &str,
        language_code: &str,
        principal: &Principal,
        route: &RouteDecision,
    ) -> Result<crate::types::RetrievalResult> {
        let authorized_collections = route.collections.clone();
        let fingerprint = fingerprint_query(query_text, language_code, &authorized_collections);

        if let Some(cached) = self.cache.get(&fingerprint).await {
            return Ok(crate::types::RetrievalResult {
                results: Vec::new(),
                expanded_parents: Vec::new(),
                from_cache: true,
            }
            .with_cached_answer(cached));
        }

        let vectors = self.embedding_service.embed(&[query_text.to_string()]).await?;
        let vector = vectors.into_iter().next().ok_or_else(|| Error::retrieval_transient("embedding service returned no vector"))?;

        let mut merged: Vec<ScoredChunk> = Vec::new();
        for collection in &authorized_collections {
            let k = self.config_k_for(collection);
            match self.vector_store.search(collection, &vector, k).await {
                Ok(mut results) => merged.append(&mut results),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(collection = %collection, error = %e, "vector search failed, proceeding without this collection");
                }
                Err(e) => return Err(e),
            }
        }

        let reranked = if self.config.reranker_enabled_tiers.iter().any(|t| t == tier_key(route.tier)) {
            self.reranker.rerank(query_text, merged).await?
        } else {
            merged
        };

        let expanded_parents = self.expand_parents(&reranked).await?;

        Ok(crate::types::RetrievalResult { results: reranked, expanded_parents, from_cache: false })
    }

    async fn expand_parents(&self, ranked: &[ScoredChunk]) -> Result<Vec<ParentDocument>> {
        let mut seen = HashSet::new();
        let mut parents = Vec::new();

        for scored in ranked.iter().take(self.config.parent_expansion_top_m) {
            let parent_id = scored.chunk.parent_id.clone();
            if !seen.insert(parent_id.clone()) {
                continue;
            }
            let parent = self.parent_store.get_parent(&parent_id).await?;
            if parent.is_canonical {
                parents.push(parent);
            }
        }

        Ok(parents)
    }

    fn config_k_for(&self, collection: &str) -> usize {
        self.collection_k.get(collection).copied().unwrap_or(DEFAULT_K)
    }

    /// Stores an answer in the semantic cache keyed by fingerprint.
    /// Last-writer-wins: a concurrent store for the same key simply
    /// overwrites.
    pub async fn cache_store(
        &self,
        query_text: &str,
        language_code: &str,
        route: &RouteDecision,
        entry: SemanticCacheEntry,
    ) {
        let fingerprint = fingerprint_query(query_text, language_code, &route.collections);
        self.cache.insert(fingerprint, entry).await;
    }

    /// Stores a finalized answer in the semantic cache, keyed by the same
    /// fingerprint `retrieve` probes. Called by the orchestrator after a
    /// turn that actually performed retrieval, so a later identical query
    /// under the same route short-circuits straight to this answer.
    pub async fn store_answer(
        &self,
        query_text: &str,
        language_code: &str,
        route: &RouteDecision,
        answer: &str,
        citations: &[crate::types::Citation],
    ) {
        let fingerprint = fingerprint_query(query_text, language_code, &route.collections);
        let entry = SemanticCacheEntry {
            query_fingerprint: fingerprint.clone(),
            route_decision: route.clone(),
            answer: answer.to_string(),
            citations: citations.to_vec(),
            stored_at: chrono::Utc::now(),
            ttl_secs: self.config.cache_ttl_secs,
        };
        self.cache.insert(fingerprint, entry).await;
    }

    /// Purges cache entries whose fingerprint starts with `prefix`.
    /// Ingestion-triggered invalidation calls this out-of-band; the core
    /// does not watch for ingestion events itself.
    pub async fn purge(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .cache
            .iter()
            .map(|(k, _)| (*k).clone())
            .filter(|k| k.starts_with(prefix))
            .collect();

        for key in &keys {
            self.cache.invalidate(key).await;
        }
        keys.len()
    }
}

fn tier_key(tier: Tier) -> &'static str {
    match tier {
        Tier::Greeting => "greeting",
        Tier::Fast => "fast",
        Tier::Pro => "pro",
        Tier::Deep => "deep",
    }
}

impl crate::types::RetrievalResult {
    fn with_cached_answer(mut self, entry: SemanticCacheEntry) -> Self {
        self.from_cache = true;
        self.results = Vec::new();
        self.expanded_parents = vec![ParentDocument {
            parent_id: "cache".to_string(),
            title: "cached answer".to_string(),
            full_text: entry.answer,
            metadata: serde_json::json!({"cached": true, "citations": entry.citations}),
            is_canonical: true,
        }];
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkMetadata};

    struct FakeVectorStore;

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        async fn search(&self, collection: &str, _vector: &[f32], _k: usize) -> Result<Vec<ScoredChunk>> {
            Ok(vec![ScoredChunk {
                chunk: Chunk {
                    chunk_id: format!("{collection}-chunk-1"),
                    parent_id: "parent-1".to_string(),
                    text: "visa requirement text".to_string(),
                    embedding_vector: vec![],
                    metadata: ChunkMetadata {
                        document_id: "doc-1".to_string(),
                        hierarchy_path: vec![],
                        ordering_keys: vec![],
                        quality_flags: vec![],
                    },
                    collection: collection.to_string(),
                },
                relevance_score: 0.9,
                rerank_score: None,
            }])
        }
    }

    /// Records the `k` it was called with per collection, so a test can
    /// assert the configured value actually reached the search call.
    struct RecordingVectorStore {
        seen_k: std::sync::Mutex<HashMap<String, usize>>,
    }

    impl RecordingVectorStore {
        fn new() -> Self {
            Self { seen_k: std::sync::Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl VectorStore for RecordingVectorStore {
        async fn search(&self, collection: &str, _vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
            self.seen_k.lock().unwrap().insert(collection.to_string(), k);
            Ok(vec![])
        }
    }

    struct FakeEmbeddingService;

    #[async_trait]
    impl EmbeddingService for FakeEmbeddingService {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct FakeReranker;

    #[async_trait]
    impl Reranker for FakeReranker {
        async fn rerank(&self, _query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>> {
            Ok(candidates)
        }
    }

    struct FakeParentStore;

    #[async_trait]
    impl ParentDocumentStore for FakeParentStore {
        async fn get_parent(&self, parent_id: &str) -> Result<ParentDocument> {
            Ok(ParentDocument {
                parent_id: parent_id.to_string(),
                title: "Visa chapter".to_string(),
                full_text: "full chapter text".to_string(),
                metadata: serde_json::json!({}),
                is_canonical: true,
            })
        }
    }

    fn test_pipeline() -> RetrievalPipeline {
        RetrievalPipeline::new(
            Arc::new(FakeVectorStore),
            Arc::new(FakeEmbeddingService),
            Arc::new(FakeReranker),
            Arc::new(FakeParentStore),
            RetrievalConfig::default(),
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn test_retrieve_assembles_results_and_expands_parents() {
        let pipeline = test_pipeline();
        let principal = Principal::new("u1", None);
        let route = RouteDecision {
            tier: Tier::Pro,
            collections: vec!["visa".to_string()],
            tools_enabled: true,
            max_iterations: 4,
            model_tier: Tier::Pro,
        };

        let result = pipeline.retrieve("work visa requirements", "en", &principal, &route).await.unwrap();
        assert!(!result.from_cache);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.expanded_parents.len(), 1);
    }

    #[tokio::test]
    async fn test_authorized_collections_only_are_searched() {
        let pipeline = test_pipeline();
        let principal = Principal::new("u1", None);
        let route = RouteDecision {
            tier: Tier::Pro,
            collections: vec![],
            tools_enabled: true,
            max_iterations: 4,
            model_tier: Tier::Pro,
        };

        let result = pipeline.retrieve("work visa requirements", "en", &principal, &route).await.unwrap();
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_cache_store_and_probe_hit() {
        let pipeline = test_pipeline();
        let route = RouteDecision {
            tier: Tier::Pro,
            collections: vec!["visa".to_string()],
            tools_enabled: true,
            max_iterations: 4,
            model_tier: Tier::Pro,
        };

        pipeline
            .cache_store(
                "work visa requirements",
                "en",
                &route,
                SemanticCacheEntry {
                    query_fingerprint: String::new(),
                    route_decision: route.clone(),
                    answer: "cached answer text".to_string(),
                    citations: vec![],
                    stored_at: chrono::Utc::now(),
                    ttl_secs: 3600,
                },
            )
            .await;

        let principal = Principal::new("u1", None);
        let result = pipeline.retrieve("work visa requirements", "en", &principal, &route).await.unwrap();
        assert!(result.from_cache);
    }

    #[tokio::test]
    async fn test_configured_per_collection_k_reaches_vector_search() {
        let store = Arc::new(RecordingVectorStore::new());
        let mut collection_k = HashMap::new();
        collection_k.insert("visa".to_string(), 3);
        collection_k.insert("tax".to_string(), 15);
        let pipeline = RetrievalPipeline::new(
            store.clone(),
            Arc::new(FakeEmbeddingService),
            Arc::new(FakeReranker),
            Arc::new(FakeParentStore),
            RetrievalConfig::default(),
            collection_k,
        );
        let principal = Principal::new("u1", None);
        let route = RouteDecision {
            tier: Tier::Pro,
            collections: vec!["visa".to_string(), "tax".to_string()],
            tools_enabled: true,
            max_iterations: 4,
            model_tier: Tier::Pro,
        };

        pipeline.retrieve("work visa and tax questions", "en", &principal, &route).await.unwrap();

        let seen = store.seen_k.lock().unwrap();
        assert_eq!(seen.get("visa"), Some(&3));
        assert_eq!(seen.get("tax"), Some(&15));
    }

    #[tokio::test]
    async fn test_unconfigured_collection_falls_back_to_default_k() {
        let store = Arc::new(RecordingVectorStore::new());
        let pipeline = RetrievalPipeline::new(
            store.clone(),
            Arc::new(FakeEmbeddingService),
            Arc::new(FakeReranker),
            Arc::new(FakeParentStore),
            RetrievalConfig::default(),
            HashMap::new(),
        );
        let principal = Principal::new("u1", None);
        let route = RouteDecision {
            tier: Tier::Pro,
            collections: vec!["visa".to_string()],
            tools_enabled: true,
            max_iterations: 4,
            model_tier: Tier::Pro,
        };

        pipeline.retrieve("work visa requirements", "en", &principal, &route).await.unwrap();

        assert_eq!(store.seen_k.lock().unwrap().get("visa"), Some(&DEFAULT_K));
    }

    #[tokio::test]
    async fn test_purge_removes_matching_prefix() {
        let pipeline = test_pipeline();
        let route = RouteDecision {
            tier: Tier::Pro,
            collections: vec!["visa".to_string()],
            tools_enabled: true,
            max_iterations: 4,
            model_tier: Tier::Pro,
        };
        pipeline
            .cache_store(
                "work visa requirements",
                "en",
                &route,
                SemanticCacheEntry {
                    query_fingerprint: String::new(),
                    route_decision: route.clone(),
                    answer: "cached".to_string(),
                    citations: vec![],
                    stored_at: chrono::Utc::now(),
                    ttl_secs: 3600,
                },
            )
            .await;

        let purged = pipeline.purge("").await;
        assert_eq!(purged, 1);

        let principal = Principal::new("u1", None);
        let result = pipeline.retrieve("work visa requirements", "en", &principal, &route).await.unwrap();
        assert!(!result.from_cache);
    }
}
