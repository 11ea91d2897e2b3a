//! Single-provider OpenAI-compatible transport. One implementation serves
//! every provider in `config::Provider` (LM Studio, Ollama, llama.cpp,
//! vLLM) since the gateway only ever speaks the OpenAI chat-completions
//! protocol to them.

use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

use super::{CompletionOutput, GenerationEvent, LlmProvider};
use crate::utils::{OpenAIMessage, OpenAIRequest, ToolCallAggregator, LlmOutputBlock};
use crate::{Error, Result};

pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), model: model.into() }
    }

    fn request(&self, messages: &[OpenAIMessage], tools: Option<serde_json::Value>, temperature: f32, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature,
            stream,
            tools,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, messages: &[OpenAIMessage], tools: Option<serde_json::Value>, temperature: f32) -> Result<CompletionOutput> {
        let mut stream = self.stream_with_tools(messages, tools, temperature).await?;
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

    async fn stream(&self, messages: &[OpenAIMessage], temperature: f32) -> Result<Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send>>> {
        self.stream_with_tools(messages, None, temperature).await
    }
}

impl OpenAiCompatibleProvider {
    async fn stream_with_tools(
        &self,
        messages: &[OpenAIMessage],
        tools: Option<serde_json::Value>,
        temperature: f32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send>>> {
        let body = self.request(messages, tools, temperature, true);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::model_transient(format!("provider request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                Error::model_transient(format!("provider returned {status}"))
            } else {
                Error::model_terminal(format!("provider returned {status}"))
            });
        }

        let chunks = crate::utils::parse_sse_stream(response);
        let mut aggregator = ToolCallAggregator::new();

        let events = chunks.flat_map(move |chunk_result| {
            let blocks = match chunk_result {
                Ok(chunk) => aggregator.process_chunk(chunk).unwrap_or_default(),
                Err(e) => {
                    return futures::stream::iter(vec![Err(e)]);
                }
            };
            let mapped: Vec<Result<GenerationEvent>> = blocks
                .into_iter()
                .map(|block| {
                    Ok(match block {
                        LlmOutputBlock::Text(t) => GenerationEvent::Token(t),
                        LlmOutputBlock::ToolUse { id, name, input } => GenerationEvent::ToolCall { id, name, input },
                    })
                })
                .collect();
            futures::stream::iter(mapped)
        });

        Ok(Box::pin(events))
    }
}
