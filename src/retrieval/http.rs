//! HTTP-client default implementations of the external store contracts: the
//! core consumes the vector store, embedding service, reranker, and
//! parent-document store over HTTP; it never owns or manages them. Follows
//! the LLM gateway's `reqwest::Client` usage (JSON request/response,
//! `Error::Http`/`Error::Api` mapping).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{EmbeddingService, ParentDocumentStore, Reranker, VectorStore};
use crate::types::{Chunk, ChunkMetadata, ParentDocument, ScoredChunk};
use crate::{Error, Result};

/// Shared HTTP transport for all four store contracts; a single
/// `reqwest::Client` is cheap to clone (it's an `Arc` internally) and reused
/// across all of them.
#[derive(Clone)]
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct VectorSearchResponseItem {
    id: String,
    score: f32,
    payload: VectorSearchPayload,
}

#[derive(Debug, Deserialize)]
struct VectorSearchPayload {
    parent_id: String,
    text: String,
    #[serde(default)]
    document_id: String,
    #[serde(default)]
    hierarchy_path: Vec<String>,
    #[serde(default)]
    ordering_keys: Vec<i64>,
    #[serde(default)]
    quality_flags: Vec<String>,
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&json!({"collection": collection, "vector": vector, "k": k}))
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("vector store request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(if status.is_server_error() {
                Error::retrieval_transient(format!("vector store returned {status}"))
            } else {
                Error::api(format!("vector store returned {status}"))
            });
        }

        let items: Vec<VectorSearchResponseItem> = response
            .json()
            .await
            .map_err(|e| Error::retrieval_transient(format!("invalid vector store response: {e}")))?;

        Ok(items
            .into_iter()
            .map(|item| ScoredChunk {
                chunk: Chunk {
                    chunk_id: item.id,
                    parent_id: item.payload.parent_id,
                    text: item.payload.text,
                    embedding_vector: Vec::new(),
                    metadata: ChunkMetadata {
                        document_id: item.payload.document_id,
                        hierarchy_path: item.payload.hierarchy_path,
                        ordering_keys: item.payload.ordering_keys,
                        quality_flags: item.payload.quality_flags,
                    },
                    collection: collection.to_string(),
                },
                relevance_score: item.score,
                rerank_score: None,
            })
            .collect())
    }
}

/// Fixed embedding dimensionality pinned per provider; the configured value
/// is trusted, not re-derived from the response.
#[derive(Clone)]
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbeddingService {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&json!({"texts": texts}))
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("embedding service request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::retrieval_transient(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::retrieval_transient(format!("invalid embedding response: {e}")))?;
        Ok(parsed.vectors)
    }
}

#[derive(Clone)]
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReranker {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct RerankResponseItem {
    index: usize,
    score: f32,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&json!({"query": query, "documents": texts}))
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("reranker request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::retrieval_transient(format!("reranker returned {}", response.status())));
        }

        let mut scored: Vec<RerankResponseItem> = response
            .json()
            .await
            .map_err(|e| Error::retrieval_transient(format!("invalid reranker response: {e}")))?;
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut candidates = candidates;
        let mut reranked = Vec::with_capacity(candidates.len());
        for item in scored {
            if item.index >= candidates.len() {
                continue;
            }
            // `take` semantics: swap the wanted element to the scanned edge
            // rather than clone, since ordering is already final.
            let mut chunk = ScoredChunk {
                chunk: candidates[item.index].chunk.clone(),
                relevance_score: candidates[item.index].relevance_score,
                rerank_score: Some(item.score),
            };
            std::mem::swap(&mut chunk, &mut candidates[item.index]);
            reranked.push(chunk);
        }
        Ok(reranked)
    }
}

#[derive(Clone)]
pub struct HttpParentDocumentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpParentDocumentStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct ParentDocumentResponse {
    title: String,
    full_text: String,
    metadata: serde_json::Value,
    is_canonical: bool,
}

#[async_trait]
impl ParentDocumentStore for HttpParentDocumentStore {
    async fn get_parent(&self, parent_id: &str) -> Result<ParentDocument> {
        let response = self
            .client
            .get(format!("{}/parents/{}", self.base_url, parent_id))
            .send()
            .await
            .map_err(|e| Error::retrieval_transient(format!("parent document store request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::retrieval_transient(format!(
                "parent document store returned {}",
                response.status()
            )));
        }

        let parsed: ParentDocumentResponse = response
            .json()
            .await
            .map_err(|e| Error::retrieval_transient(format!("invalid parent document response: {e}")))?;

        Ok(ParentDocument {
            parent_id: parent_id.to_string(),
            title: parsed.title,
            full_text: parsed.full_text,
            metadata: parsed.metadata,
            is_canonical: parsed.is_canonical,
        })
    }
}
