//! Integration tests combining the Retrieval Pipeline (C6) with the Evidence
//! & Output Pipeline (C8), and the Query Router (C2) with retrieval's
//! authorization gate — cross-module behavior that no single unit test
//! module exercises on its own.

use async_trait::async_trait;
use nuzantara_core::config::{CollectionConfig, OrchestratorConfig, PiiConfig, RetrievalConfig, RouterConfig};
use nuzantara_core::evidence::EvidencePipeline;
use nuzantara_core::retrieval::{EmbeddingService, ParentDocumentStore, Reranker, RetrievalPipeline, VectorStore};
use nuzantara_core::router::QueryRouter;
use nuzantara_core::types::{Chunk, ChunkMetadata, ParentDocument, Principal, RouteDecision, ScoredChunk, Tier};
use nuzantara_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

struct FakeVectorStore {
    text: String,
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn search(&self, collection: &str, _vector: &[f32], _k: usize) -> Result<Vec<ScoredChunk>> {
        Ok(vec![ScoredChunk {
            chunk: Chunk {
                chunk_id: format!("{collection}-c1"),
                parent_id: "parent-1".to_string(),
                text: self.text.clone(),
                embedding_vector: vec![],
                metadata: ChunkMetadata {
                    document_id: format!("{collection}-doc"),
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

struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn search(&self, _collection: &str, _vector: &[f32], _k: usize) -> Result<Vec<ScoredChunk>> {
        Err(Error::retrieval_transient("vector store unreachable"))
    }
}

struct FakeEmbeddingService;

#[async_trait]
impl EmbeddingService for FakeEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
    }
}

struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
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
            title: "chapter".to_string(),
            full_text: "full text".to_string(),
            metadata: serde_json::json!({}),
            is_canonical: true,
        })
    }
}

fn router() -> QueryRouter {
    let mut collections = HashMap::new();
    collections.insert("visa".to_string(), CollectionConfig { enabled: true, role_required: None, k: 8, precedence: 10 });
    let mut caps = HashMap::new();
    caps.insert("pro".to_string(), 4);
    QueryRouter::new(RouterConfig::default(), collections, caps)
}

fn pipeline_with_text(text: &str) -> RetrievalPipeline {
    RetrievalPipeline::new(
        Arc::new(FakeVectorStore { text: text.to_string() }),
        Arc::new(FakeEmbeddingService),
        Arc::new(PassthroughReranker),
        Arc::new(FakeParentStore),
        RetrievalConfig::default(),
        HashMap::new(),
    )
}

fn evidence() -> EvidencePipeline {
    EvidencePipeline::new(&OrchestratorConfig::default(), &PiiConfig::default())
}

/// Citations only reference chunks retrieved this same turn — wiring the
/// router's collection selection straight into the
/// retrieval pipeline, then the retrieved chunks straight into evidence
/// finalization, exercises the full chain end to end.
#[tokio::test]
async fn test_router_to_retrieval_to_evidence_binds_real_citations() {
    let router = router();
    let principal = Principal::new("u1", None);
    let query_text = "what documents do I need for a work visa sponsor company passport";

    let decision = router.route(query_text, &principal);
    assert!(decision.collections.contains(&"visa".to_string()));

    let pipeline = pipeline_with_text("A work visa sponsor company must provide a valid passport and sponsorship letter");
    let retrieval = pipeline.retrieve(query_text, "en", &principal, &decision).await.unwrap();
    assert!(!retrieval.results.is_empty());

    let pack = evidence().finalize(
        "You need a sponsor company and a valid passport for a work visa.",
        query_text,
        &retrieval.results,
        decision.tier,
    );

    assert!(!pack.citations.is_empty());
    assert!(pack.verification_score > 0.0);
}

/// An answer that shares no vocabulary with anything retrieved this turn
/// must never be cited, and its verification score must reflect that.
#[tokio::test]
async fn test_unbound_answer_after_retrieval_has_no_citations() {
    let router = router();
    let principal = Principal::new("u1", None);
    let query_text = "tell me about Bali beaches";

    let decision = router.route(query_text, &principal);
    let pipeline = pipeline_with_text("completely unrelated passage about tax filing deadlines and penalties");
    let retrieval = pipeline.retrieve(query_text, "en", &principal, &decision).await.unwrap();

    let pack = evidence().finalize("Bali has beautiful beaches and world-class surf spots.", query_text, &retrieval.results, decision.tier);

    assert!(pack.citations.is_empty());
    assert!(pack.verification_score < 0.5);
}

/// A principal lacking the required role for a collection never has it
/// searched, even though the pipeline itself has no
/// authorization logic of its own — authorization happens entirely upstream
/// in the router's collection selection.
#[tokio::test]
async fn test_retrieval_never_searches_unauthorized_collection() {
    let mut collections = HashMap::new();
    collections.insert("internal_hr".to_string(), CollectionConfig { enabled: true, role_required: Some("staff".to_string()), k: 8, precedence: 1 });
    let mut caps = HashMap::new();
    caps.insert("pro".to_string(), 4);
    let router = QueryRouter::new(RouterConfig::default(), collections, caps);

    let anonymous = Principal::new("u1", None);
    let decision = router.route("internal_hr policy", &anonymous);
    assert!(decision.collections.is_empty());

    let pipeline = RetrievalPipeline::new(
        Arc::new(FailingVectorStore),
        Arc::new(FakeEmbeddingService),
        Arc::new(PassthroughReranker),
        Arc::new(FakeParentStore),
        RetrievalConfig::default(),
        HashMap::new(),
    );

    let result = pipeline.retrieve("internal_hr policy", "en", &anonymous, &decision).await.unwrap();
    assert!(result.results.is_empty());
}

/// A transient vector-store failure degrades to an empty result for that
/// collection rather than failing the whole turn.
#[tokio::test]
async fn test_retrieval_degrades_on_transient_vector_store_error() {
    let principal = Principal::new("u1", None);
    let decision = RouteDecision { tier: Tier::Pro, collections: vec!["visa".to_string()], tools_enabled: true, max_iterations: 4, model_tier: Tier::Pro };

    let pipeline = RetrievalPipeline::new(
        Arc::new(FailingVectorStore),
        Arc::new(FakeEmbeddingService),
        Arc::new(PassthroughReranker),
        Arc::new(FakeParentStore),
        RetrievalConfig::default(),
        HashMap::new(),
    );

    let result = pipeline.retrieve("work visa", "en", &principal, &decision).await.unwrap();
    assert!(result.results.is_empty());
    assert!(!result.from_cache);
}
