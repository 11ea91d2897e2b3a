//! Configuration surface.
//!
//! Recognized options: `collections`, `router`, `orchestrator`, `llm`,
//! `retrieval`, `memory`, `pii`, `limits`. Loaded from a JSON file (see
//! DESIGN.md for why `serde_json` rather than `toml`) with environment
//! variable overrides, e.g. `NUZANTARA_BASE_URL`/`NUZANTARA_MODEL`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================================================
// PROVIDER ENUM (used inside llm.tier_cascades)
// ============================================================================

/// Supported LLM server providers. Every provider implements the
/// OpenAI-compatible chat-completions API, making them interchangeable from
/// the LLM Gateway's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Base URL resolution: env override, then provider default, then fallback.
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("NUZANTARA_BASE_URL") {
        return url;
    }
    if let Some(p) = provider {
        return p.default_url().to_string();
    }
    fallback.unwrap_or(Provider::LMStudio.default_url()).to_string()
}

// ============================================================================
// CONFIGURATION SURFACE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub enabled: bool,
    #[serde(default)]
    pub role_required: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub precedence: i32,
}

fn default_k() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_greeting_max_tokens")]
    pub greeting_max_tokens: usize,
    #[serde(default = "default_greeting_patterns")]
    pub greeting_patterns: Vec<String>,
    #[serde(default = "default_tier")]
    pub default_tier: crate::types::Tier,
}

fn default_greeting_max_tokens() -> usize {
    4
}

fn default_greeting_patterns() -> Vec<String> {
    vec![
        "ciao".into(),
        "hello".into(),
        "hi".into(),
        "hai".into(),
        "grazie".into(),
        "thanks".into(),
        "thank you".into(),
        "terima kasih".into(),
    ]
}

fn default_tier() -> crate::types::Tier {
    crate::types::Tier::Pro
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            greeting_max_tokens: default_greeting_max_tokens(),
            greeting_patterns: default_greeting_patterns(),
            default_tier: default_tier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations_per_tier")]
    pub max_iterations_per_tier: HashMap<String, u32>,
    #[serde(default = "default_output_min_chars")]
    pub output_min_chars: usize,
    #[serde(default = "default_reasoning_leak_patterns")]
    pub reasoning_leak_patterns: Vec<String>,
    /// Context-window budget handed to the LLM Gateway for each PLANNING and
    /// FINALIZING call.
    #[serde(default = "default_model_context_tokens")]
    pub model_context_tokens: usize,
    #[serde(default = "default_reserved_output_tokens")]
    pub reserved_output_tokens: usize,
}

fn default_model_context_tokens() -> usize {
    8192
}

fn default_reserved_output_tokens() -> usize {
    1024
}

fn default_max_iterations_per_tier() -> HashMap<String, u32> {
    let mut m = HashMap::new();
    m.insert("greeting".to_string(), 0);
    m.insert("fast".to_string(), 2);
    m.insert("pro".to_string(), 4);
    m.insert("deep".to_string(), 6);
    m
}

fn default_output_min_chars() -> usize {
    8
}

fn default_reasoning_leak_patterns() -> Vec<String> {
    vec![
        r"^Thought:".into(),
        r"^Observation:".into(),
        r"^Okay, (since|with|given|without|lacking)".into(),
        r"Zantara has provided the final answer\.".into(),
    ]
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_tier: default_max_iterations_per_tier(),
            output_min_chars: default_output_min_chars(),
            reasoning_leak_patterns: default_reasoning_leak_patterns(),
            model_context_tokens: default_model_context_tokens(),
            reserved_output_tokens: default_reserved_output_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCascadeEntry {
    pub provider: Provider,
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_per_attempt_timeout_ms")]
    pub per_attempt_timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_per_attempt_timeout_ms() -> u64 {
    20_000
}

fn default_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub tier_cascades: HashMap<String, Vec<TierCascadeEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_reranker_enabled_tiers")]
    pub reranker_enabled_tiers: Vec<String>,
    #[serde(default = "default_parent_expansion_top_m")]
    pub parent_expansion_top_m: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    pub vector_store_url: Option<String>,
    pub embedding_service_url: Option<String>,
    pub reranker_url: Option<String>,
    pub parent_document_store_url: Option<String>,
}

fn default_reranker_enabled_tiers() -> Vec<String> {
    vec!["pro".into(), "deep".into()]
}

fn default_parent_expansion_top_m() -> usize {
    3
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            reranker_enabled_tiers: default_reranker_enabled_tiers(),
            parent_expansion_top_m: default_parent_expansion_top_m(),
            cache_ttl_secs: default_cache_ttl_secs(),
            vector_store_url: None,
            embedding_service_url: None,
            reranker_url: None,
            parent_document_store_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_summarization_trigger")]
    pub summarization_trigger_tokens: usize,
}

fn default_history_window() -> usize {
    10
}

fn default_summarization_trigger() -> usize {
    6000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            summarization_trigger_tokens: default_summarization_trigger(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiConfig {
    #[serde(default = "default_pii_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_redaction_placeholder")]
    pub redaction_placeholder: String,
}

fn default_pii_patterns() -> Vec<String> {
    vec![
        // Phone numbers (loose international form)
        r"\+?\d[\d\s().-]{7,}\d".into(),
        // Indonesian KTP / generic 16-digit personal id
        r"\b\d{16}\b".into(),
    ]
}

fn default_redaction_placeholder() -> String {
    "[REDACTED]".to_string()
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            patterns: default_pii_patterns(),
            redaction_placeholder: default_redaction_placeholder(),
        }
    }
}

/// Endpoints for the business-data tools (C5) that are not part of the
/// retrieval stack proper: `pricing_lookup`, `team_lookup`, `vision_analyze`.
/// A `None` URL disables the corresponding tool's HTTP backend in favor of
/// the static in-process catalog the bootstrap falls back to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    pub pricing_service_url: Option<String>,
    pub team_service_url: Option<String>,
    pub vision_service_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_turn_deadline_ms")]
    pub turn_deadline_ms: u64,
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_default_ms: u64,
    #[serde(default = "default_cancellation_grace_ms")]
    pub cancellation_grace_ms: u64,
}

fn default_turn_deadline_ms() -> u64 {
    60_000
}

fn default_tool_timeout_ms() -> u64 {
    10_000
}

fn default_cancellation_grace_ms() -> u64 {
    3_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            turn_deadline_ms: default_turn_deadline_ms(),
            tool_timeout_default_ms: default_tool_timeout_ms(),
            cancellation_grace_ms: default_cancellation_grace_ms(),
        }
    }
}

/// Root configuration object.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    #[serde(default)]
    pub collections: HashMap<String, CollectionConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub pii: PiiConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl CoreConfig {
    /// Load configuration from a JSON file, falling back to defaults for any
    /// section omitted by the file. `NUZANTARA_BASE_URL` and other env
    /// overrides are applied by the components that read them, not here.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {}", path.display(), e)))?;
        let config: CoreConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("parsing {}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn max_iterations_for(&self, tier: crate::types::Tier) -> u32 {
        let key = match tier {
            crate::types::Tier::Greeting => "greeting",
            crate::types::Tier::Fast => "fast",
            crate::types::Tier::Pro => "pro",
            crate::types::Tier::Deep => "deep",
        };
        self.orchestrator
            .max_iterations_per_tier
            .get(key)
            .copied()
            .unwrap_or_else(|| tier.default_max_iterations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_default_urls() {
        assert_eq!(Provider::LMStudio.default_url(), "http://localhost:1234/v1");
        assert_eq!(Provider::Ollama.default_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("ollama".parse::<Provider>(), Ok(Provider::Ollama));
        assert!("unknown".parse::<Provider>().is_err());
    }

    #[test]
    fn test_default_config_has_all_tiers() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.max_iterations_for(crate::types::Tier::Greeting), 0);
        assert_eq!(cfg.max_iterations_for(crate::types::Tier::Deep), 6);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = CoreConfig::load("/nonexistent/path/config.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join("nuzantara_test_config.json");
        std::fs::write(&path, r#"{"memory": {"history_window": 20}}"#).unwrap();

        let cfg = CoreConfig::load(&path).unwrap();
        assert_eq!(cfg.memory.history_window, 20);
        assert_eq!(cfg.limits.turn_deadline_ms, default_turn_deadline_ms());

        std::fs::remove_file(&path).ok();
    }
}
