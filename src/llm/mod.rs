//! LLM Gateway (C7): `generate(prompt, tier, stream?) → tokens | final_text`
//! with a tier-aware fallback cascade, retry, and token budgeting.
//!
//! Request-building and SSE consumption live in `provider.rs`, per-provider
//! backoff in `retry.rs`, and token budgeting plus streaming chunk
//! aggregation in `context.rs`/`utils.rs` — composed here around a `Vec` of
//! tiered provider cascades (`llm.tier_cascades` in configuration).

mod provider;

use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TierCascadeEntry;
use crate::context;
use crate::retry::RetryConfig;
use crate::types::{Entity, EntityKind, Message, Tier};
use crate::{Error, Result};

pub use provider::OpenAiCompatibleProvider;

/// A single step or token event produced by a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Token(String),
    ToolCall { id: String, name: String, input: serde_json::Value },
}

/// Fully collected output of a non-streaming `complete` call (used by the
/// orchestrator's per-iteration PLANNING step, which must parse the whole
/// model turn before deciding what to do next).
#[derive(Debug, Clone, Default)]
pub struct CompletionOutput {
    pub text: String,
    pub tool_calls: Vec<(String, String, serde_json::Value)>,
    pub provider_label: String,
}

/// Everything the gateway needs to assemble a single generation call.
/// History and entities arrive untruncated; the gateway is responsible for
/// fitting them to the model's context window.
pub struct GenerationRequest {
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub entities: HashMap<EntityKind, Entity>,
    pub summary_preamble: Option<String>,
    pub tools: Option<serde_json::Value>,
    pub tier: Tier,
    pub model_limit_tokens: usize,
    pub reserved_output_tokens: usize,
    pub temperature: f32,
}

impl GenerationRequest {
    /// Messages fitted to the model's context window: system prompt,
    /// entity snapshot, then as much recent history as fits.
    fn wire_messages(&self) -> Vec<crate::utils::OpenAIMessage> {
        let budget = context::available_history_tokens(
            self.model_limit_tokens,
            self.reserved_output_tokens,
            &self.system_prompt,
            &self.entities,
        );
        // 1 token ≈ 4 chars; keep halving the window until history fits,
        // rather than counting exactly per-message (good enough given the
        // character-based estimator already used throughout context.rs).
        let mut keep = self.history.len();
        let mut truncated = context::truncate_messages(&self.history, keep, self.summary_preamble.as_deref());
        while context::estimate_tokens(&truncated) > budget && keep > 0 {
            keep -= 1;
            truncated = context::truncate_messages(&self.history, keep, self.summary_preamble.as_deref());
        }

        let mut messages = vec![crate::utils::OpenAIMessage {
            role: "system".to_string(),
            content: render_system_prompt(&self.system_prompt, &self.entities),
        }];
        for message in &truncated {
            let role = match message.role {
                crate::types::MessageRole::User => "user",
                crate::types::MessageRole::Assistant => "assistant",
                crate::types::MessageRole::Tool => "tool",
            };
            messages.push(crate::utils::OpenAIMessage { role: role.to_string(), content: message.content.clone() });
        }
        messages
    }
}

fn render_system_prompt(base: &str, entities: &HashMap<EntityKind, Entity>) -> String {
    if entities.is_empty() {
        return base.to_string();
    }
    let mut rendered = base.to_string();
    rendered.push_str("\n\nKnown context about this user (do not restate anything not listed here):\n");
    for entity in entities.values() {
        rendered.push_str(&format!("- {:?}: {}\n", entity.kind, entity.value));
    }
    rendered
}

/// Implemented by a single provider entry in a tier's cascade. One
/// implementation (`OpenAiCompatibleProvider`) covers every provider named
/// in `config::Provider` since they all speak the same wire protocol.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: &[crate::utils::OpenAIMessage], tools: Option<serde_json::Value>, temperature: f32) -> Result<CompletionOutput>;

    async fn stream(
        &self,
        messages: &[crate::utils::OpenAIMessage],
        temperature: f32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send>>>;
}

struct CascadeEntry {
    provider: Arc<dyn LlmProvider>,
    label: String,
    per_attempt_timeout: Duration,
    retries: u32,
}

/// Tier-aware fallback cascade: `generate`/`complete`/`stream` try each
/// provider in order, advancing past retryable failures and aborting
/// immediately on the first non-retryable one.
pub struct LlmGateway {
    cascades: HashMap<String, Vec<CascadeEntry>>,
}

pub struct LlmGatewayBuilder {
    cascades: HashMap<String, Vec<CascadeEntry>>,
}

impl LlmGatewayBuilder {
    pub fn new() -> Self {
        Self { cascades: HashMap::new() }
    }

    pub fn tier(mut self, tier: Tier, entries: Vec<TierCascadeEntry>) -> Self {
        let built = entries
            .into_iter()
            .map(|entry| {
                let base_url = entry.base_url.clone().unwrap_or_else(|| entry.provider.default_url().to_string());
                CascadeEntry {
                    label: format!("{:?}:{}", entry.provider, entry.model),
                    provider: Arc::new(OpenAiCompatibleProvider::new(base_url, entry.model)),
                    per_attempt_timeout: Duration::from_millis(entry.per_attempt_timeout_ms),
                    retries: entry.retries,
                }
            })
            .collect();
        self.cascades.insert(tier_key(tier).to_string(), built);
        self
    }

    pub fn build(self) -> LlmGateway {
        LlmGateway { cascades: self.cascades }
    }
}

impl Default for LlmGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmGateway {
    pub fn builder() -> LlmGatewayBuilder {
        LlmGatewayBuilder::new()
    }

    fn cascade_for(&self, tier: Tier) -> Result<&[CascadeEntry]> {
        self.cascades
            .get(tier_key(tier))
            .map(Vec::as_slice)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::model_terminal(format!("no provider cascade configured for tier {:?}", tier)))
    }

    /// Non-streaming generation used by the orchestrator's PLANNING step:
    /// the whole model turn is collected so the step parser has complete
    /// text to work with.
    pub async fn complete(&self, request: &GenerationRequest) -> Result<CompletionOutput> {
        let cascade = self.cascade_for(request.tier)?;
        let messages = request.wire_messages();

        let mut last_err: Option<Error> = None;
        for entry in cascade {
            let retry_config = RetryConfig::new().with_max_attempts(entry.retries.max(1));
            let result = crate::retry::retry_with_backoff_conditional(retry_config, || async {
                tokio::time::timeout(
                    entry.per_attempt_timeout,
                    entry.provider.complete(&messages, request.tools.clone(), request.temperature),
                )
                .await
                .map_err(|_| Error::model_transient(format!("{} timed out", entry.label)))?
            })
            .await;

            match result {
                Ok(mut output) => {
                    output.provider_label = entry.label.clone();
                    return Ok(output);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(provider = %entry.label, error = %e, "provider failed, advancing cascade");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(Error::model_terminal(format!("{}: {}", entry.label, e))),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::model_terminal("cascade exhausted")))
    }

    /// Streaming generation used during FINALIZING: tokens are yielded as
    /// they arrive so the gateway can re-emit them on the outbound `chunk`
    /// events without buffering the full answer.
    /// Fallback only applies to connection establishment, not mid-stream —
    /// once tokens have started flowing to the caller, switching providers
    /// would duplicate or lose text.
    pub async fn stream(&self, request: &GenerationRequest) -> Result<Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send>>> {
        let cascade = self.cascade_for(request.tier)?;
        let messages = request.wire_messages();

        let mut last_err: Option<Error> = None;
        for entry in cascade {
            match tokio::time::timeout(entry.per_attempt_timeout, entry.provider.stream(&messages, request.temperature)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) if e.is_retryable() => {
                    tracing::warn!(provider = %entry.label, error = %e, "provider stream failed to start, advancing cascade");
                    last_err = Some(e);
                    continue;
                }
                Ok(Err(e)) => return Err(Error::model_terminal(format!("{}: {}", entry.label, e))),
                Err(_) => {
                    last_err = Some(Error::model_transient(format!("{} timed out starting stream", entry.label)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::model_terminal("cascade exhausted")))
    }
}

/// Test-only constructor: registers a single fake provider under every
/// tier, so orchestrator tests can exercise the full PLANNING/FINALIZING
/// flow without a real provider cascade.
#[cfg(test)]
pub fn gateway_for_test(provider: Box<dyn LlmProvider>) -> LlmGateway {
    let provider: Arc<dyn LlmProvider> = Arc::from(provider);
    let mut cascades = HashMap::new();
    for tier in [Tier::Greeting, Tier::Fast, Tier::Pro, Tier::Deep] {
        cascades.insert(
            tier_key(tier).to_string(),
            vec![CascadeEntry {
                provider: provider.clone(),
                label: "fake".to_string(),
                per_attempt_timeout: Duration::from_secs(5),
                retries: 1,
            }],
        );
    }
    LlmGateway { cascades }
}

fn tier_key(tier: Tier) -> &'static str {
    match tier {
        Tier::Greeting => "greeting",
        Tier::Fast => "fast",
        Tier::Pro => "pro",
        Tier::Deep => "deep",
    }
}

/// Drains a streaming generation into a single [`CompletionOutput`], for
/// callers that started a stream but need the aggregate (e.g. the
/// out-of-domain recovery path reusing the finalization stream).
pub async fn drain_stream(mut stream: Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send>>) -> Result<CompletionOutput> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    while let Some(event) = stream.next().await {
        match event? {
            GenerationEvent::Token(t) => text.push_str(&t),
            GenerationEvent::ToolCall { id, name, input } => tool_calls.push((id, name, input)),
        }
    }
    Ok(CompletionOutput { text, tool_calls, provider_label: String::new() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    fn msg(role: MessageRole, content: &str) -> Message {
        match role {
            MessageRole::User => Message::user(content),
            MessageRole::Assistant => Message::assistant(content, vec![]),
            MessageRole::Tool => Message::tool("t", serde_json::json!({}), serde_json::json!({})),
        }
    }

    #[test]
    fn test_wire_messages_includes_system_prompt_first() {
        let request = GenerationRequest {
            system_prompt: "You are Nuzantara.".to_string(),
            history: vec![msg(MessageRole::User, "ciao")],
            entities: HashMap::new(),
            summary_preamble: None,
            tools: None,
            tier: Tier::Fast,
            model_limit_tokens: 8000,
            reserved_output_tokens: 1000,
            temperature: 0.2,
        };
        let wire = request.wire_messages();
        assert_eq!(wire[0].role, "system");
        assert!(wire[0].content.contains("Nuzantara"));
        assert_eq!(wire[1].role, "user");
    }

    #[test]
    fn test_wire_messages_truncates_to_fit_tiny_budget() {
        let history: Vec<Message> = (0..50).map(|i| msg(MessageRole::User, &format!("message number {i} with some padding text"))).collect();
        let request = GenerationRequest {
            system_prompt: "sys".to_string(),
            history,
            entities: HashMap::new(),
            summary_preamble: None,
            tools: None,
            tier: Tier::Fast,
            model_limit_tokens: 100,
            reserved_output_tokens: 50,
            temperature: 0.2,
        };
        let wire = request.wire_messages();
        // system + at most a handful of recent turns, never all 50.
        assert!(wire.len() < 50);
    }

    #[test]
    fn test_render_system_prompt_includes_known_entities() {
        let mut entities = HashMap::new();
        entities.insert(
            EntityKind::Name,
            Entity { kind: EntityKind::Name, value: "Marco".to_string(), confidence: 0.9, turn_index: 1 },
        );
        let rendered = render_system_prompt("base prompt", &entities);
        assert!(rendered.contains("Marco"));
        assert!(rendered.contains("base prompt"));
    }

    #[tokio::test]
    async fn test_complete_errors_when_tier_has_no_cascade() {
        let gateway = LlmGateway::builder().build();
        let request = GenerationRequest {
            system_prompt: "sys".to_string(),
            history: vec![],
            entities: HashMap::new(),
            summary_preamble: None,
            tools: None,
            tier: Tier::Deep,
            model_limit_tokens: 8000,
            reserved_output_tokens: 500,
            temperature: 0.2,
        };
        let result = gateway.complete(&request).await;
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), Error::ModelTerminal(_)));
    }
}
