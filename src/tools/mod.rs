//! Tool Registry & Executor (C5).
//!
//! Tools are declared at startup with `(name, input_schema, output_schema,
//! timeout, idempotency)`. The registry is immutable after boot — there is
//! no dynamic discovery: `ToolRegistry::builder()` collects tools, `.build()`
//! freezes them into an `Arc`-shared map handed to the Orchestrator at
//! construction time.

pub mod builtin;
pub mod http_backends;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::hooks::{Hooks, PostToolUseEvent, PreToolUseEvent};
use crate::types::{ToolInvocation, ToolOutcome};
use crate::{Error, Result};

/// Implemented by every tool. Kept as a trait (rather than a boxed closure)
/// so built-in tools can hold typed client handles (the vector store
/// client, the pricing catalog, etc.) without capturing them into an
/// opaque closure.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value>;
}

/// Blanket impl so a plain async closure can still be registered directly,
/// matching the ergonomics of `Tool::new`.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value> {
        (self.0)(args).await
    }
}

/// `(name, input_schema, output_schema, timeout, idempotency)`.
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    output_schema: Value,
    timeout: Duration,
    idempotent: bool,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &Value {
        &self.output_schema
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    /// OpenAI-style function-calling schema for the LLM Gateway's prompt
    /// assembly step.
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

impl Clone for Tool {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            timeout: self.timeout,
            idempotent: self.idempotent,
            handler: self.handler.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("idempotent", &self.idempotent)
            .finish()
    }
}

/// Builder for [`Tool`]. Schema accepts either a simple
/// `{"param": "type"}` map (all required) or a full JSON Schema object
/// passed through as-is.
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: Option<Value>,
    output_schema: Value,
    timeout: Duration,
    idempotent: bool,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
            output_schema: serde_json::json!({"type": "object"}),
            timeout: Duration::from_secs(10),
            idempotent: false,
        }
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(normalize_schema(schema));
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Tool {
            name: self.name,
            description: self.description,
            input_schema: self
                .input_schema
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            output_schema: self.output_schema,
            timeout: self.timeout,
            idempotent: self.idempotent,
            handler: Arc::new(FnHandler(handler)),
        }
    }
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Converts the simple `{"param": "type"}` notation into JSON Schema;
/// anything already shaped like `{"type": ..., "properties": ...}` passes
/// through untouched.
fn normalize_schema(schema: Value) -> Value {
    if let Some(obj) = schema.as_object() {
        if obj.contains_key("type") && obj.contains_key("properties") {
            return schema;
        }

        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (key, value) in obj {
            required.push(Value::String(key.clone()));
            let prop = match value.as_str() {
                Some(type_str) => serde_json::json!({"type": type_str}),
                None => value.clone(),
            };
            properties.insert(key.clone(), prop);
        }

        return serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
    }
    schema
}

/// Immutable, thread-safe collection of tools, populated once at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<HashMap<String, Tool>>,
}

pub struct ToolRegistryBuilder {
    tools: HashMap<String, Tool>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(mut self, tool: Tool) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: Arc::new(self.tools) }
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Schemas for all registered tools, for the LLM Gateway's prompt
    /// assembly and for the startup documentation endpoint.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.to_openai_format()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

/// Dispatches tool calls against a [`ToolRegistry`]: validates args against
/// schema presence, runs the tool under its declared timeout, and normalizes
/// the result. Tool errors never abort the turn — they are
/// returned as an `Ok(ToolInvocation)` with `outcome != Ok` for the caller
/// (the Orchestrator) to fold into an `Observation{error}` step.
pub struct ToolExecutor {
    registry: ToolRegistry,
    hooks: Hooks,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, hooks: Hooks) -> Self {
        Self { registry, hooks }
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        tool_use_id: &str,
        history: Vec<Value>,
    ) -> ToolInvocation {
        let started_at = chrono::Utc::now();

        let Some(tool) = self.registry.get(name) else {
            return ToolInvocation {
                name: name.to_string(),
                args_json: args,
                started_at,
                finished_at: chrono::Utc::now(),
                outcome: ToolOutcome::Error,
                result_or_error: serde_json::json!({"error": format!("unknown tool: {name}")}),
            };
        };

        let pre = PreToolUseEvent::new(name.to_string(), args.clone(), tool_use_id.to_string(), history.clone());
        if let Some(decision) = self.hooks.execute_pre_tool_use(pre).await {
            if !decision.continue_execution {
                return ToolInvocation {
                    name: name.to_string(),
                    args_json: args,
                    started_at,
                    finished_at: chrono::Utc::now(),
                    outcome: ToolOutcome::Error,
                    result_or_error: serde_json::json!({
                        "error": decision.reason.unwrap_or_else(|| "blocked by hook".to_string())
                    }),
                };
            }
        }

        let call_args = args.clone();
        let call_result = tokio::time::timeout(tool.timeout(), tool.handler.call(call_args)).await;

        let finished_at = chrono::Utc::now();
        let (outcome, result_or_error) = match call_result {
            Ok(Ok(value)) => (ToolOutcome::Ok, value),
            Ok(Err(e)) => (ToolOutcome::Error, serde_json::json!({"error": e.to_string()})),
            Err(_) => (
                ToolOutcome::Timeout,
                serde_json::json!({"error": format!("tool '{name}' timed out after {:?}", tool.timeout())}),
            ),
        };

        let post = PostToolUseEvent::new(
            name.to_string(),
            args.clone(),
            tool_use_id.to_string(),
            result_or_error.clone(),
            history,
        );
        self.hooks.execute_post_tool_use(post).await;

        ToolInvocation {
            name: name.to_string(),
            args_json: args,
            started_at,
            finished_at,
            outcome,
            result_or_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_schema_simple_notation() {
        let schema = normalize_schema(serde_json::json!({"query": "string", "k": "integer"}));
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "query"));
    }

    #[test]
    fn test_normalize_schema_passthrough_full_json_schema() {
        let full = serde_json::json!({"type": "object", "properties": {"a": {"type": "string"}}});
        let schema = normalize_schema(full.clone());
        assert_eq!(schema, full);
    }

    #[tokio::test]
    async fn test_registry_is_immutable_after_build() {
        let registry = ToolRegistry::builder()
            .register(tool("echo", "echoes input").build(|args| async move { Ok(args) }))
            .build();

        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_executor_runs_known_tool() {
        let registry = ToolRegistry::builder()
            .register(
                tool("double", "doubles a number")
                    .schema(serde_json::json!({"n": "number"}))
                    .build(|args| async move {
                        let n = args["n"].as_f64().unwrap_or(0.0);
                        Ok(serde_json::json!({"result": n * 2.0}))
                    }),
            )
            .build();
        let executor = ToolExecutor::new(registry, Hooks::new());

        let invocation = executor
            .execute("double", serde_json::json!({"n": 21}), "call_1", vec![])
            .await;

        assert_eq!(invocation.outcome, ToolOutcome::Ok);
        assert_eq!(invocation.result_or_error["result"], 42.0);
    }

    #[tokio::test]
    async fn test_executor_unknown_tool_is_error_not_panic() {
        let registry = ToolRegistry::builder().build();
        let executor = ToolExecutor::new(registry, Hooks::new());

        let invocation = executor
            .execute("nonexistent", serde_json::json!({}), "call_1", vec![])
            .await;

        assert_eq!(invocation.outcome, ToolOutcome::Error);
    }

    #[tokio::test]
    async fn test_executor_honors_timeout() {
        let registry = ToolRegistry::builder()
            .register(
                tool("slow", "sleeps forever")
                    .timeout(Duration::from_millis(20))
                    .build(|_args| async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(serde_json::json!({}))
                    }),
            )
            .build();
        let executor = ToolExecutor::new(registry, Hooks::new());

        let invocation = executor
            .execute("slow", serde_json::json!({}), "call_1", vec![])
            .await;

        assert_eq!(invocation.outcome, ToolOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_pre_tool_use_hook_can_block() {
        let registry = ToolRegistry::builder()
            .register(tool("dangerous", "does something risky").build(|_| async move { Ok(serde_json::json!({})) }))
            .build();
        let hooks = Hooks::new().add_pre_tool_use(|event| async move {
            if event.tool_name == "dangerous" {
                return Some(crate::hooks::HookDecision::block("not allowed for this principal"));
            }
            None
        });
        let executor = ToolExecutor::new(registry, hooks);

        let invocation = executor
            .execute("dangerous", serde_json::json!({}), "call_1", vec![])
            .await;

        assert_eq!(invocation.outcome, ToolOutcome::Error);
    }
}
