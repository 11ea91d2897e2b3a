//! Binary entry point: wires every component (C1-C8) together and serves
//! the Request Gateway over HTTP/SSE.
//!
//! `clap` CLI args, `tracing_subscriber` `EnvFilter` initialization,
//! `tokio::net::TcpListener` + `axum::serve`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use nuzantara_core::config::{CoreConfig, Provider};
use nuzantara_core::evidence::EvidencePipeline;
use nuzantara_core::gateway::{self, GatewayState};
use nuzantara_core::llm::LlmGatewayBuilder;
use nuzantara_core::memory::InMemorySessionStore;
use nuzantara_core::orchestrator::Orchestrator;
use nuzantara_core::retrieval::{HttpEmbeddingService, HttpParentDocumentStore, HttpReranker, HttpVectorStore, RetrievalPipeline};
use nuzantara_core::router::QueryRouter;
use nuzantara_core::tools::builtin::{diagnostics_tool, pricing_lookup_tool, team_lookup_tool, vector_search_tool, vision_analyze_tool};
use nuzantara_core::tools::http_backends::{
    HttpPricingBackend, HttpTeamBackend, HttpVisionBackend, RetrievalSearchBackend, StaticPricingBackend, StaticTeamBackend,
    UnconfiguredVisionBackend,
};
use nuzantara_core::tools::{ToolExecutor, ToolRegistry};
use nuzantara_core::types::Tier;
use nuzantara_core::Hooks;

#[derive(Parser, Debug)]
#[command(author, version, about = "Nuzantara Core: agentic RAG orchestrator server")]
struct Args {
    /// Address to bind the gateway to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nuzantara_core=info,tower_http=info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let args = Args::parse();

    let config = if args.config.exists() {
        CoreConfig::load(&args.config).with_context(|| format!("loading config from {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "config file not found, using defaults");
        CoreConfig::default()
    };

    info!(addr = %args.addr, config = %args.config.display(), "starting nuzantara-core");

    let http_client = reqwest::Client::new();

    // --- C6: retrieval pipeline ---
    let vector_store = Arc::new(HttpVectorStore::new(
        http_client.clone(),
        config.retrieval.vector_store_url.clone().unwrap_or_else(|| "http://localhost:6333".to_string()),
    ));
    let embedding_service = Arc::new(HttpEmbeddingService::new(
        http_client.clone(),
        config.retrieval.embedding_service_url.clone().unwrap_or_else(|| "http://localhost:8081".to_string()),
    ));
    let reranker = Arc::new(HttpReranker::new(
        http_client.clone(),
        config.retrieval.reranker_url.clone().unwrap_or_else(|| "http://localhost:8082".to_string()),
    ));
    let parent_store = Arc::new(HttpParentDocumentStore::new(
        http_client.clone(),
        config.retrieval.parent_document_store_url.clone().unwrap_or_else(|| "http://localhost:8083".to_string()),
    ));
    let collection_k: std::collections::HashMap<String, usize> =
        config.collections.iter().map(|(name, cfg)| (name.clone(), cfg.k)).collect();
    let retrieval = Arc::new(RetrievalPipeline::new(
        vector_store,
        embedding_service,
        reranker,
        parent_store,
        config.retrieval.clone(),
        collection_k,
    ));

    // --- C3: conversation memory ---
    let memory = Arc::new(InMemorySessionStore::new(config.memory.clone()));

    // --- C7: LLM gateway, one provider cascade per tier ---
    let mut llm_builder = LlmGatewayBuilder::new();
    for (tier_key, entries) in &config.llm.tier_cascades {
        let tier = match tier_key.as_str() {
            "greeting" => Tier::Greeting,
            "fast" => Tier::Fast,
            "pro" => Tier::Pro,
            "deep" => Tier::Deep,
            other => {
                info!(tier = %other, "ignoring unknown tier key in llm.tier_cascades");
                continue;
            }
        };
        llm_builder = llm_builder.tier(tier, entries.clone());
    }
    // A cascade must exist for every tier the router can produce; fall back
    // to a single LM Studio entry per tier when the config omits one.
    for tier in [Tier::Greeting, Tier::Fast, Tier::Pro, Tier::Deep] {
        let key = match tier {
            Tier::Greeting => "greeting",
            Tier::Fast => "fast",
            Tier::Pro => "pro",
            Tier::Deep => "deep",
        };
        if !config.llm.tier_cascades.contains_key(key) {
            llm_builder = llm_builder.tier(
                tier,
                vec![nuzantara_core::config::TierCascadeEntry {
                    provider: Provider::LMStudio,
                    model: "qwen2.5-32b-instruct".to_string(),
                    base_url: None,
                    per_attempt_timeout_ms: 20_000,
                    retries: 2,
                }],
            );
        }
    }
    let llm = Arc::new(llm_builder.build());

    // --- C5: tool registry ---
    let registry_names = Arc::new(vec![
        "vector_search".to_string(),
        "pricing_lookup".to_string(),
        "team_lookup".to_string(),
        "diagnostics".to_string(),
        "vision_analyze".to_string(),
    ]);
    let started_at = chrono::Utc::now();

    let search_backend = Arc::new(RetrievalSearchBackend::new(Arc::clone(&retrieval)));

    let pricing_tool = match &config.tools.pricing_service_url {
        Some(url) => pricing_lookup_tool(Arc::new(HttpPricingBackend::new(http_client.clone(), url.clone()))),
        None => pricing_lookup_tool(Arc::new(StaticPricingBackend::new())),
    };
    let team_tool = match &config.tools.team_service_url {
        Some(url) => team_lookup_tool(Arc::new(HttpTeamBackend::new(http_client.clone(), url.clone()))),
        None => team_lookup_tool(Arc::new(StaticTeamBackend::new())),
    };

    let vision_tool = match &config.tools.vision_service_url {
        Some(url) => vision_analyze_tool(Arc::new(HttpVisionBackend::new(http_client.clone(), url.clone()))),
        None => vision_analyze_tool(Arc::new(UnconfiguredVisionBackend)),
    };

    let tool_registry = ToolRegistry::builder()
        .register(vector_search_tool(search_backend))
        .register(pricing_tool)
        .register(team_tool)
        .register(diagnostics_tool(Arc::clone(&registry_names), started_at))
        .register(vision_tool)
        .build();
    let tool_executor = Arc::new(ToolExecutor::new(tool_registry.clone(), Hooks::new()));

    // --- C8: evidence pipeline ---
    let evidence = Arc::new(EvidencePipeline::new(&config.orchestrator, &config.pii));

    // --- C4: orchestrator ---
    let orchestrator = Arc::new(Orchestrator::new(
        memory.clone(),
        Arc::clone(&retrieval),
        llm,
        tool_registry,
        tool_executor,
        evidence,
        config.limits.clone(),
        config.memory.clone(),
        config.orchestrator.clone(),
    ));

    // --- C2: query router ---
    let max_iterations_per_tier = config.orchestrator.max_iterations_per_tier.clone();
    let router = QueryRouter::new(config.router.clone(), config.collections.clone(), max_iterations_per_tier);

    let state = Arc::new(GatewayState { router, orchestrator, retrieval, memory, limits: config.limits.clone(), started_at });

    let app = gateway::build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.addr).await.with_context(|| format!("binding {}", args.addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
