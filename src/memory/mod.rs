//! Conversation Memory (C3).
//!
//! Exposes `load_history`, `append`, `snapshot_entities`, `extract_and_merge`.
//! Every operation is keyed by `(session_id, principal_id)` — cross-session
//! reads are forbidden even for the same principal, so the key pair is
//! checked on every call rather than trusted from a prior lookup.

mod entities;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::MemoryConfig;
use crate::context;
use crate::types::{EntityKind, EntitySnapshot, Message, SessionId};
use crate::{Error, Result};

pub use entities::{extract_entities, merge_entities, EntityDelta};

/// Conversation memory backend. Implementations must uphold session
/// isolation (no cross-session visibility) and insertion-order preservation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_history(&self, session_id: &SessionId, principal_id: &str, limit: usize) -> Result<Vec<Message>>;
    async fn append(&self, session_id: &SessionId, principal_id: &str, message: Message) -> Result<()>;
    async fn snapshot_entities(&self, session_id: &SessionId, principal_id: &str) -> Result<EntitySnapshot>;
    async fn extract_and_merge(
        &self,
        session_id: &SessionId,
        principal_id: &str,
        user_text: &str,
        turn_index: u32,
    ) -> Result<EntityDelta>;
    /// The precomputed summarized preamble for messages older than the
    /// retained window, if a background summarization workflow produced
    /// one. Returns `None` when no summary exists yet.
    async fn summary_preamble(&self, session_id: &SessionId, principal_id: &str) -> Result<Option<String>>;
}

struct SessionRecord {
    principal_id: String,
    messages: Vec<Message>,
    entities: EntitySnapshot,
    summary_preamble: Option<String>,
}

/// In-process `SessionStore`. One `tokio::sync::Mutex` per session rather
/// than a single store-wide lock, so turns on unrelated sessions never
/// serialize against each other — the per-key granularity the Orchestrator
/// needs to avoid lost-update anomalies without a global bottleneck.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionRecord>>>>,
    config: MemoryConfig,
}

impl InMemorySessionStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), config }
    }

    async fn session_lock(&self, session_id: &SessionId, principal_id: &str) -> Result<Arc<Mutex<SessionRecord>>> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.entry(session_id.as_str().to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(SessionRecord {
                principal_id: principal_id.to_string(),
                messages: Vec::new(),
                entities: HashMap::new(),
                summary_preamble: None,
            }))
        });
        Ok(entry.clone())
    }

    /// Session isolation enforcement point: a session created under one
    /// principal can never be read or written by another. This is a programming error,
    /// not a transient condition, so it is rejected with `AuthorizationError`
    /// rather than silently scoped away.
    fn check_ownership(record: &SessionRecord, principal_id: &str) -> Result<()> {
        if record.principal_id != principal_id {
            return Err(Error::authorization(format!(
                "session is owned by a different principal"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_history(&self, session_id: &SessionId, principal_id: &str, limit: usize) -> Result<Vec<Message>> {
        let lock = self.session_lock(session_id, principal_id).await?;
        let record = lock.lock().await;
        Self::check_ownership(&record, principal_id)?;

        // Messages are stored and returned in insertion order.
        Ok(context::truncate_messages(&record.messages, limit, record.summary_preamble.as_deref()))
    }

    async fn append(&self, session_id: &SessionId, principal_id: &str, message: Message) -> Result<()> {
        let lock = self.session_lock(session_id, principal_id).await?;
        let mut record = lock.lock().await;
        Self::check_ownership(&record, principal_id)?;
        record.messages.push(message);
        Ok(())
    }

    async fn snapshot_entities(&self, session_id: &SessionId, principal_id: &str) -> Result<EntitySnapshot> {
        let lock = self.session_lock(session_id, principal_id).await?;
        let record = lock.lock().await;
        Self::check_ownership(&record, principal_id)?;
        Ok(record.entities.clone())
    }

    async fn extract_and_merge(
        &self,
        session_id: &SessionId,
        principal_id: &str,
        user_text: &str,
        turn_index: u32,
    ) -> Result<EntityDelta> {
        let lock = self.session_lock(session_id, principal_id).await?;
        let mut record = lock.lock().await;
        Self::check_ownership(&record, principal_id)?;

        let extracted = extract_entities(user_text, turn_index);
        let delta = merge_entities(&mut record.entities, extracted);

        if context::estimate_tokens(&record.messages) > self.config.summarization_trigger_tokens
            && record.summary_preamble.is_none()
        {
            record.summary_preamble = Some(synthesize_summary_stub(&record.messages));
        }

        Ok(delta)
    }

    async fn summary_preamble(&self, session_id: &SessionId, principal_id: &str) -> Result<Option<String>> {
        let lock = self.session_lock(session_id, principal_id).await?;
        let record = lock.lock().await;
        Self::check_ownership(&record, principal_id)?;
        Ok(record.summary_preamble.clone())
    }
}

/// Placeholder summarizer. Summarization is a separate background workflow
/// that the core merely reads from — generating summaries via an LLM call
/// is out of scope here. This produces a deterministic, low-fidelity
/// compaction so the token-budgeting path has something to read until a
/// real summarization worker is wired in.
fn synthesize_summary_stub(messages: &[Message]) -> String {
    let turns = messages.len();
    format!("[earlier conversation: {turns} prior messages omitted for length]")
}
