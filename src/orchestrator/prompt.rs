//! System prompt assembly for the ReAct loop.
//!
//! Tool schemas are rendered as descriptive text rather than passed through
//! a provider's native function-calling field, matching the tagged-variant
//! design in `step.rs`: every provider in the cascade only needs to speak
//! plain chat completions, not each vendor's own tool-calling dialect.

use crate::tools::ToolRegistry;
use crate::types::Language;

const BASE_PERSONA: &str = "\
You are Nuzantara, an assistant for foreigners navigating Indonesian visas, \
tax, and company setup. Answer only from information you have retrieved or \
already verified; never invent a regulation, fee, or deadline. If you do not \
know, say so plainly instead of guessing.";

/// Builds the system prompt for a single PLANNING-loop iteration: persona,
/// language directive, tool catalogue, and the running scratchpad of
/// Thought/Action/Observation steps taken so far this turn.
pub fn build_planning_prompt(language: Language, tools: &ToolRegistry, scratchpad: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(BASE_PERSONA);
    prompt.push_str(&language_directive(language));
    prompt.push_str(&render_tool_catalogue(tools));
    prompt.push_str("\n\nRespond with exactly one of the following shapes, nothing else:\n");
    prompt.push_str("Thought: <your reasoning>\nAction: <tool name>\nAction Input: <JSON object>\n\n");
    prompt.push_str("or, once you have enough information:\n\n");
    prompt.push_str("Thought: <your reasoning>\nFinal Answer: <your complete answer to the user>\n");

    if !scratchpad.is_empty() {
        prompt.push_str("\n\nSteps taken so far this turn:\n");
        prompt.push_str(scratchpad);
    }

    prompt
}

/// Builds the system prompt for the FINALIZING call: no tool catalogue, no
/// ReAct formatting, a direct instruction to answer the user now. The
/// malformed-output recovery path and the greeting-tier short circuit both
/// reuse this.
pub fn build_finalizing_prompt(language: Language, reason: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(BASE_PERSONA);
    prompt.push_str(&language_directive(language));
    prompt.push_str("\n\nGive the user a direct, final answer now. Do not use Thought/Action/Observation \
        formatting and do not mention tools, retrieval, or your own reasoning process.");
    if let Some(reason) = reason {
        prompt.push_str(&format!("\n\n{reason}"));
    }
    prompt
}

fn language_directive(language: Language) -> String {
    let name = match language {
        Language::Italian => "Italian",
        Language::English => "English",
        Language::Indonesian => "Indonesian",
        Language::Other => return String::new(),
    };
    format!("\n\nRespond in {name}, matching the language the user wrote in.")
}

fn render_tool_catalogue(tools: &ToolRegistry) -> String {
    let names = tools.names();
    if names.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nAvailable tools:\n");
    for schema in tools.schemas() {
        let name = schema["function"]["name"].as_str().unwrap_or_default();
        let description = schema["function"]["description"].as_str().unwrap_or_default();
        out.push_str(&format!("- {name}: {description}\n"));
    }
    out
}

/// Renders one completed ReAct step into the plain-text scratchpad format
/// fed back to the model on the next PLANNING call (never persisted to
/// conversation memory; this is per-turn and ephemeral).
pub fn render_scratchpad_entry(thought: Option<&str>, tool: &str, args: &serde_json::Value, observation: &serde_json::Value) -> String {
    let mut entry = String::new();
    if let Some(thought) = thought {
        entry.push_str(&format!("Thought: {thought}\n"));
    }
    entry.push_str(&format!("Action: {tool}\nAction Input: {args}\nObservation: {observation}\n"));
    entry
}
