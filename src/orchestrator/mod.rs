//! Agentic Orchestrator (C4): the per-turn ReAct loop, wiring together the
//! Query Router's decision, Conversation Memory, the Retrieval Pipeline,
//! the Tool Registry/Executor, the LLM Gateway, and the Evidence & Output
//! Pipeline.
//!
//! State machine: `INIT -> PLANNING -> TOOL_RUNNING -> OBSERVING ->
//! PLANNING ... -> FINALIZING -> DONE | ERROR | CANCELLED`. Modeled as a
//! loop with explicit phase markers rather than an enum-driven state
//! object: every transition here is a straight-line consequence of the
//! previous step's outcome.
//!
//! Builds on the LLM Gateway's SSE-consumption and retry patterns
//! (`llm/provider.rs`, `retry.rs`), generalized here from "run one
//! completion" to "run a bounded sequence of completions and tool calls
//! before producing one."

mod prompt;
pub mod step;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{LimitsConfig, MemoryConfig, OrchestratorConfig};
use crate::evidence::EvidencePipeline;
use crate::llm::{GenerationRequest, LlmGateway};
use crate::memory::SessionStore;
use crate::retrieval::RetrievalPipeline;
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::types::{Citation, EvidencePack, Language, Message, Query, RouteDecision, ScoredChunk, ToolInvocation, ToolOutcome};
use crate::Error;

pub use step::{parse_step, Step};

/// One event in the outbound stream a turn produces; the gateway (C1)
/// forwards these as SSE events in order.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Status { phase: &'static str, detail: Option<String> },
    ToolStart { name: String, args: serde_json::Value },
    ToolEnd { name: String, outcome: String, summary: Option<String> },
    Chunk { text: String },
    Sources { citations: Vec<Citation>, verification_score: f32 },
    Done { session_id: String, turn_index: u32 },
    Error { kind: String, message: String },
}

/// Cooperative cancellation signal, checked at suspension points (before
/// each LLM call, before each tool dispatch, before finalizing) rather than
/// forcibly aborting the task. A cancelled turn closes the stream with no
/// terminal event; it does not leave partially-applied state.
#[derive(Clone)]
pub struct CancellationToken(watch::Receiver<bool>);

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Held by the gateway; `cancel()` on client disconnect or deadline.
pub struct CancellationSource(watch::Sender<bool>);

impl CancellationSource {
    pub fn new() -> (Self, CancellationToken) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), CancellationToken(rx))
    }

    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

pub struct Orchestrator {
    memory: Arc<dyn SessionStore>,
    retrieval: Arc<RetrievalPipeline>,
    llm: Arc<LlmGateway>,
    tool_registry: ToolRegistry,
    tool_executor: Arc<ToolExecutor>,
    evidence: Arc<EvidencePipeline>,
    limits: LimitsConfig,
    memory_config: MemoryConfig,
    orchestrator_config: OrchestratorConfig,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    session_turn_index: Mutex<HashMap<String, u32>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        memory: Arc<dyn SessionStore>,
        retrieval: Arc<RetrievalPipeline>,
        llm: Arc<LlmGateway>,
        tool_registry: ToolRegistry,
        tool_executor: Arc<ToolExecutor>,
        evidence: Arc<EvidencePipeline>,
        limits: LimitsConfig,
        memory_config: MemoryConfig,
        orchestrator_config: OrchestratorConfig,
    ) -> Self {
        Self {
            memory,
            retrieval,
            llm,
            tool_registry,
            tool_executor,
            evidence,
            limits,
            memory_config,
            orchestrator_config,
            session_locks: Mutex::new(HashMap::new()),
            session_turn_index: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one full turn, returning a stream of [`TurnEvent`]s. This never
    /// returns an `Err` itself — every failure becomes an `Error` event
    /// inside the stream, and a cancelled turn simply ends the stream with
    /// no terminal event.
    pub fn run_turn(self: &Arc<Self>, query: Query, route: RouteDecision, cancel: CancellationToken) -> ReceiverStream<TurnEvent> {
        let (tx, rx) = mpsc::channel(64);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive_turn(query, route, cancel, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive_turn(self: Arc<Self>, query: Query, route: RouteDecision, mut cancel: CancellationToken, tx: mpsc::Sender<TurnEvent>) {
        let session_key = query.session_id.as_str().to_string();

        // Turns on the same session are serialized end-to-end: this
        // per-session lock is held across every suspension point in
        // `run_inner` by design, the one deliberate exception to "never hold
        // exclusive locks across suspension points" since serializing
        // same-session turns *is* that guarantee.
        let lock = self.session_lock(&session_key).await;
        let _turn_guard = lock.lock().await;

        if cancel.is_cancelled() {
            return;
        }

        match self.run_inner(&query, &route, &mut cancel, &tx).await {
            Ok(turn_index) => {
                let _ = tx.send(TurnEvent::Done { session_id: session_key, turn_index }).await;
            }
            Err(Error::Cancelled) => {}
            Err(e) => {
                let _ = tx.send(TurnEvent::Error { kind: e.kind_name().to_string(), message: e.to_string() }).await;
            }
        }
    }

    async fn session_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks.entry(session_key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn next_turn_index(&self, session_key: &str) -> u32 {
        let mut counters = self.session_turn_index.lock().await;
        let counter = counters.entry(session_key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    async fn run_inner(
        &self,
        query: &Query,
        route: &RouteDecision,
        cancel: &mut CancellationToken,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> crate::Result<u32> {
        let start = Instant::now();
        let deadline = Duration::from_millis(self.limits.turn_deadline_ms);
        let principal_id = query.principal.id.clone();
        let session_key = query.session_id.as_str().to_string();
        let language = crate::utils::detect_language(&query.text);
        let turn_index = self.next_turn_index(&session_key).await;

        if let Err(e) = self.memory.extract_and_merge(&query.session_id, &principal_id, &query.text, turn_index).await {
            tracing::warn!(error = %e, "entity extraction failed, continuing without entity update");
        }

        let history = match self.memory.load_history(&query.session_id, &principal_id, self.memory_config.history_window).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "conversation history load failed, continuing with empty history");
                Vec::new()
            }
        };
        let entities = self.memory.snapshot_entities(&query.session_id, &principal_id).await.unwrap_or_default();
        let summary_preamble = self.memory.summary_preamble(&query.session_id, &principal_id).await.ok().flatten();

        let _ = tx.send(TurnEvent::Status { phase: "planning", detail: None }).await;

        let mut retrieved: Vec<ScoredChunk> = Vec::new();

        if !route.collections.is_empty() {
            match self.retrieval.retrieve(&query.text, language.code(), &query.principal, route).await {
                Ok(result) if result.from_cache => {
                    if let Some(parent) = result.expanded_parents.first() {
                        let citations: Vec<Citation> = parent
                            .metadata
                            .get("citations")
                            .and_then(|v| serde_json::from_value(v.clone()).ok())
                            .unwrap_or_default();
                        let pack = EvidencePack {
                            answer_text: parent.full_text.clone(),
                            citations,
                            verification_score: 1.0,
                            format_template: None,
                        };
                        self.stream_answer_and_persist(query, pack, tx).await?;
                        return Ok(turn_index);
                    }
                }
                Ok(result) => retrieved = result.results,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "initial retrieval failed, proceeding without seeded context");
                }
                Err(e) => return Err(e),
            }
        }

        let mut scratchpad = String::new();
        let mut iteration = 0u32;
        let mut final_raw: Option<String> = None;

        while iteration < route.max_iterations {
            if cancel.is_cancelled() || start.elapsed() > deadline {
                return Err(Error::Cancelled);
            }

            let planning_prompt = prompt::build_planning_prompt(language, &self.tool_registry, &scratchpad);
            let request = self.planning_request(planning_prompt, &history, &entities, &summary_preamble, route.model_tier);
            let completion = self.llm.complete(&request).await?;

            match step::parse_step(&completion.text) {
                Ok(Step::Thought(thought)) => {
                    scratchpad.push_str(&format!("Thought: {thought}\n"));
                }
                Ok(Step::FinalAnswer(text)) => {
                    final_raw = Some(text);
                    break;
                }
                Ok(Step::Action { tool, args }) => {
                    if !route.tools_enabled {
                        scratchpad.push_str(&format!(
                            "Action: {tool}\nObservation: tools are disabled for this query; answer from what you already know.\n"
                        ));
                        iteration += 1;
                        continue;
                    }

                    let _ = tx.send(TurnEvent::Status { phase: "tool_running", detail: Some(tool.clone()) }).await;
                    let _ = tx.send(TurnEvent::ToolStart { name: tool.clone(), args: args.clone() }).await;

                    let invocation = if tool == "vector_search" {
                        self.run_vector_search_tool(query, route, language, &args, &mut retrieved).await
                    } else {
                        self.tool_executor.execute(&tool, args.clone(), &format!("{session_key}-t{turn_index}-i{iteration}"), vec![]).await
                    };

                    let _ = tx
                        .send(TurnEvent::ToolEnd {
                            name: tool.clone(),
                            outcome: outcome_label(invocation.outcome).to_string(),
                            summary: summarize_result(&invocation.result_or_error),
                        })
                        .await;
                    let _ = tx.send(TurnEvent::Status { phase: "observing", detail: None }).await;

                    scratchpad.push_str(&prompt::render_scratchpad_entry(None, &tool, &args, &invocation.result_or_error));
                    iteration += 1;
                }
                Err(parse_err) => {
                    scratchpad.push_str(&format!("Observation: your previous response could not be parsed ({parse_err}). Reply using exactly one of the documented shapes.\n"));
                    iteration += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _ = tx.send(TurnEvent::Status { phase: "finalizing", detail: None }).await;

        let raw_answer = match final_raw {
            Some(text) => text,
            None => self.synthesize_final_answer(language, route.model_tier, &history, &entities, &summary_preamble, None).await?,
        };

        let filtered = match self.evidence.filter_reasoning_leak(&raw_answer) {
            Some(text) => text,
            None => {
                let retry_raw = self
                    .synthesize_final_answer(
                        language,
                        route.model_tier,
                        &history,
                        &entities,
                        &summary_preamble,
                        Some("Your previous attempt did not produce a usable answer. Answer the user's question directly now."),
                    )
                    .await?;
                self.evidence.filter_reasoning_leak(&retry_raw).unwrap_or_else(|| out_of_domain_message(language))
            }
        };

        let pack = self.evidence.finalize(&filtered, &query.text, &retrieved, route.tier);

        if !route.collections.is_empty() {
            self.retrieval.store_answer(&query.text, language.code(), route, &pack.answer_text, &pack.citations).await;
        }

        self.stream_answer_and_persist(query, pack, tx).await?;

        Ok(turn_index)
    }

    fn planning_request(
        &self,
        system_prompt: String,
        history: &[Message],
        entities: &crate::types::EntitySnapshot,
        summary_preamble: &Option<String>,
        tier: crate::types::Tier,
    ) -> GenerationRequest {
        GenerationRequest {
            system_prompt,
            history: history.to_vec(),
            entities: entities.clone(),
            summary_preamble: summary_preamble.clone(),
            tools: None,
            tier,
            model_limit_tokens: self.orchestrator_config.model_context_tokens,
            reserved_output_tokens: self.orchestrator_config.reserved_output_tokens,
            temperature: 0.2,
        }
    }

    /// One non-streaming FINALIZING call. The full answer is collected
    /// before filtering rather than streamed token-by-token, so the
    /// reasoning-leak filter sees complete text before anything reaches the
    /// wire — `stream_answer_and_persist` then re-chunks the already-clean
    /// text for the outbound `chunk` events.
    async fn synthesize_final_answer(
        &self,
        language: Language,
        tier: crate::types::Tier,
        history: &[Message],
        entities: &crate::types::EntitySnapshot,
        summary_preamble: &Option<String>,
        reason: Option<&str>,
    ) -> crate::Result<String> {
        let finalizing_prompt = prompt::build_finalizing_prompt(language, reason);
        let request = self.planning_request(finalizing_prompt, history, entities, summary_preamble, tier);
        let output = self.llm.complete(&request).await?;
        Ok(output.text)
    }

    async fn run_vector_search_tool(
        &self,
        query: &Query,
        route: &RouteDecision,
        language: Language,
        args: &serde_json::Value,
        retrieved: &mut Vec<ScoredChunk>,
    ) -> ToolInvocation {
        let started_at = chrono::Utc::now();
        let search_text = args.get("query").and_then(|v| v.as_str()).unwrap_or(&query.text);

        match self.retrieval.retrieve(search_text, language.code(), &query.principal, route).await {
            Ok(result) => {
                let preview: Vec<serde_json::Value> = result
                    .results
                    .iter()
                    .map(|c| serde_json::json!({"chunk_id": c.chunk.chunk_id, "excerpt": excerpt_preview(&c.chunk.text)}))
                    .collect();
                let count = result.results.len();
                retrieved.extend(result.results);

                ToolInvocation {
                    name: "vector_search".to_string(),
                    args_json: args.clone(),
                    started_at,
                    finished_at: chrono::Utc::now(),
                    outcome: ToolOutcome::Ok,
                    result_or_error: serde_json::json!({"count": count, "chunks": preview}),
                }
            }
            Err(e) => ToolInvocation {
                name: "vector_search".to_string(),
                args_json: args.clone(),
                started_at,
                finished_at: chrono::Utc::now(),
                outcome: if matches!(e, Error::Timeout) { ToolOutcome::Timeout } else { ToolOutcome::Error },
                result_or_error: serde_json::json!({"error": e.to_string()}),
            },
        }
    }

    /// Emits the final answer as chunked `Chunk` events, a `Sources` event,
    /// then persists both the user turn and the redacted assistant turn.
    /// Memory write failures degrade (logged, turn still answered) rather
    /// than surface as a terminal error.
    async fn stream_answer_and_persist(&self, query: &Query, pack: EvidencePack, tx: &mpsc::Sender<TurnEvent>) -> crate::Result<()> {
        for piece in chunk_text(&pack.answer_text, 80) {
            let _ = tx.send(TurnEvent::Chunk { text: piece }).await;
        }
        let _ = tx.send(TurnEvent::Sources { citations: pack.citations.clone(), verification_score: pack.verification_score }).await;

        let principal_id = query.principal.id.clone();
        if let Err(e) = self.memory.append(&query.session_id, &principal_id, Message::user(query.text.clone())).await {
            tracing::warn!(error = %e, "failed to persist user message");
        }

        let persisted_answer = self.evidence.redact_for_persistence(&pack.answer_text);
        let assistant_message = Message::assistant(persisted_answer, pack.citations.clone());
        if let Err(e) = self.memory.append(&query.session_id, &principal_id, assistant_message).await {
            tracing::warn!(error = %e, "failed to persist assistant message");
        }

        Ok(())
    }
}

fn outcome_label(outcome: ToolOutcome) -> &'static str {
    match outcome {
        ToolOutcome::Ok => "ok",
        ToolOutcome::Error => "error",
        ToolOutcome::Timeout => "timeout",
    }
}

/// Short human-readable summary for the `ToolEnd` event, not the full
/// payload — the full tool result only lives in the scratchpad the model
/// sees, never in the outbound stream.
fn summarize_result(result: &serde_json::Value) -> Option<String> {
    if let Some(error) = result.get("error").and_then(|v| v.as_str()) {
        return Some(error.to_string());
    }
    if let Some(count) = result.get("count").and_then(|v| v.as_u64()) {
        return Some(format!("{count} result(s)"));
    }
    None
}

fn excerpt_preview(text: &str) -> String {
    if text.chars().count() <= 120 {
        return text.to_string();
    }
    let truncated: String = text.chars().take(120).collect();
    format!("{truncated}…")
}

/// Splits already-finalized text into word-bounded pieces of roughly
/// `target_len` characters, for the simulated-streaming `Chunk` events
/// (see `synthesize_final_answer`'s doc comment for why FINALIZING text
/// isn't streamed token-by-token directly from the provider).
fn chunk_text(text: &str, target_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_inclusive(' ') {
        current.push_str(word);
        if current.len() >= target_len {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn out_of_domain_message(language: Language) -> String {
    match language {
        Language::Italian => {
            "Non ho trovato informazioni sufficienti per rispondere con sicurezza a questa domanda.".to_string()
        }
        Language::Indonesian => {
            "Saya tidak menemukan informasi yang cukup untuk menjawab pertanyaan ini dengan yakin.".to_string()
        }
        _ => "I could not find enough information to answer this confidently.".to_string(),
    }
}
