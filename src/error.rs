//! Error types for the Nuzantara core.
//!
//! The taxonomy mirrors the error-kind design: most variants correspond
//! 1:1 to a handling policy (retry, surface, degrade, observe-and-continue)
//! rather than to a layer of the stack.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the core.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failure talking to an LLM provider, the vector store,
    /// the reranker, or the parent-document store.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Raw API error from an upstream server, not yet classified as
    /// transient or terminal.
    #[error("API error: {0}")]
    Api(String),

    /// Streaming transport error (SSE parsing, connection drop mid-stream).
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Catch-all for errors that don't need their own variant.
    #[error("Error: {0}")]
    Other(String),

    // --- domain error kinds ---
    /// Malformed input: empty query, unknown session. Never retried,
    /// surfaced as a terminal `error` event.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Principal lacks access to a requested collection or resource.
    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    /// Vector store / reranker timeout or 5xx. Retried with backoff; on
    /// persistent failure the orchestrator proceeds without that collection.
    #[error("Retrieval transient error: {0}")]
    RetrievalTransient(String),

    /// A tool invocation failed or timed out. Becomes an `Observation{error}`
    /// in the step trace; never aborts the turn.
    #[error("Tool execution error: {0}")]
    ToolError(String),

    /// LLM transient failure (rate-limit, timeout, transient 5xx). Drives
    /// the fallback cascade in the LLM Gateway.
    #[error("Model transient error: {0}")]
    ModelTransient(String),

    /// Policy rejection, malformed output, or cascade exhausted. Surfaced
    /// as a terminal `error` event.
    #[error("Model terminal error: {0}")]
    ModelTerminal(String),

    /// Conversation memory read/write failure. Logged and degraded rather
    /// than surfaced: the turn is still answered with a lowered
    /// verification score.
    #[error("Memory error: {0}")]
    MemoryError(String),

    /// Caller disconnected or the turn deadline was exceeded. The stream
    /// closes with no further events and no `error` event is emitted.
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Error::ToolError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::ValidationError(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn timeout() -> Self {
        Error::Timeout
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::ValidationError(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Error::AuthorizationError(msg.into())
    }

    pub fn retrieval_transient(msg: impl Into<String>) -> Self {
        Error::RetrievalTransient(msg.into())
    }

    pub fn model_transient(msg: impl Into<String>) -> Self {
        Error::ModelTransient(msg.into())
    }

    pub fn model_terminal(msg: impl Into<String>) -> Self {
        Error::ModelTerminal(msg.into())
    }

    pub fn memory(msg: impl Into<String>) -> Self {
        Error::MemoryError(msg.into())
    }

    /// The error-kind name, used as the `kind` field of the outbound
    /// `error` SSE event.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::ValidationError(_) => "ValidationError",
            Error::AuthorizationError(_) => "AuthorizationError",
            Error::RetrievalTransient(_) => "RetrievalTransient",
            Error::ToolError(_) => "ToolError",
            Error::ModelTransient(_) => "ModelTransient",
            Error::ModelTerminal(_) => "ModelTerminal",
            Error::MemoryError(_) => "MemoryError",
            Error::Cancelled => "Cancelled",
            Error::Http(_) | Error::Timeout => "ModelTransient",
            Error::Json(_) | Error::Stream(_) => "ModelTerminal",
            Error::Config(_) => "ValidationError",
            Error::Api(_) | Error::Other(_) => "ModelTerminal",
        }
    }

    /// Whether this error should drive a retry (fallback cascade, backoff
    /// loop) rather than be surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout | Error::RetrievalTransient(_) | Error::ModelTransient(_) => true,
            Error::Api(msg) => {
                msg.contains("500") || msg.contains("502") || msg.contains("503") || msg.contains("504")
            }
            Error::Stream(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model");
    }

    #[test]
    fn test_error_api() {
        let err = Error::api("500 Internal Server Error");
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
    }

    #[test]
    fn test_error_stream() {
        let err = Error::stream("Connection lost");
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(err.to_string(), "Streaming error: Connection lost");
    }

    #[test]
    fn test_error_tool() {
        let err = Error::tool("Tool not found");
        assert!(matches!(err, Error::ToolError(_)));
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
    }

    #[test]
    fn test_kind_name_matches_wire_error_names() {
        assert_eq!(Error::validation("x").kind_name(), "ValidationError");
        assert_eq!(Error::authorization("x").kind_name(), "AuthorizationError");
        assert_eq!(Error::retrieval_transient("x").kind_name(), "RetrievalTransient");
        assert_eq!(Error::tool("x").kind_name(), "ToolError");
        assert_eq!(Error::model_transient("x").kind_name(), "ModelTransient");
        assert_eq!(Error::model_terminal("x").kind_name(), "ModelTerminal");
        assert_eq!(Error::memory("x").kind_name(), "MemoryError");
        assert_eq!(Error::Cancelled.kind_name(), "Cancelled");
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::timeout().is_retryable());
        assert!(Error::model_transient("rate limited").is_retryable());
        assert!(Error::api("503 Service Unavailable").is_retryable());
        assert!(!Error::validation("empty query").is_retryable());
        assert!(!Error::authorization("no access").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }
        fn _returns_error() -> Result<i32> {
            Err(Error::timeout())
        }
    }
}
