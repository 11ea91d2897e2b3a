//! ReAct step parsing: model step output is a tagged variant with a strict
//! parser, rather than relying on a provider's native function-calling
//! format. The model is prompted (see `prompt.rs`) to emit one of four
//! shapes per turn of the loop:
//!
//! ```text
//! Thought: <reasoning>
//! ```
//! ```text
//! Thought: <reasoning>
//! Action: <tool name>
//! Action Input: <json object>
//! ```
//! ```text
//! Thought: <reasoning>
//! Final Answer: <text>
//! ```
//!
//! Anything that doesn't fit one of these shapes is a parse error, not a
//! panic — the orchestrator folds it into an `Observation{error}` so the
//! model can see its own mistake and recover.

/// One parsed unit of the ReAct loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Thought(String),
    Action { tool: String, args: serde_json::Value },
    FinalAnswer(String),
}

/// Parses a single raw model completion into a [`Step`]. `Final Answer:`
/// takes precedence over `Action:` if a (malformed) turn somehow contains
/// both markers, since a final answer is never itself an intermediate step.
pub fn parse_step(raw: &str) -> Result<Step, String> {
    let thought = extract_field(raw, "Thought:").unwrap_or_default();

    if let Some(final_answer) = extract_field(raw, "Final Answer:") {
        return Ok(Step::FinalAnswer(final_answer));
    }

    if let Some(tool) = extract_field(raw, "Action:") {
        let tool = tool.lines().next().unwrap_or("").trim().to_string();
        if tool.is_empty() {
            return Err("Action: was present but named no tool".to_string());
        }
        let Some(input_raw) = extract_field(raw, "Action Input:") else {
            return Err(format!("Action '{tool}' had no Action Input:"));
        };
        let args = parse_action_input(&input_raw)?;
        return Ok(Step::Action { tool, args });
    }

    if !thought.is_empty() {
        return Ok(Step::Thought(thought));
    }

    Err("model output matched none of Thought/Action/Final Answer".to_string())
}

/// `Action Input:` is expected to be a JSON object; a bare string is wrapped
/// into `{"input": ...}` so a model that forgets to quote-and-brace its
/// input still produces something the tool executor can consume.
fn parse_action_input(raw: &str) -> Result<serde_json::Value, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::json!({ "input": trimmed })),
    }
}

/// Finds `marker` at the start of a line (case-sensitive, matching the
/// prompted format exactly) and returns everything up to the next recognized
/// marker or end of text.
fn extract_field(raw: &str, marker: &str) -> Option<String> {
    let start = raw.find(marker)? + marker.len();
    let rest = &raw[start..];

    const MARKERS: &[&str] = &["Thought:", "Action:", "Action Input:", "Final Answer:"];
    let end = MARKERS
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());

    Some(rest[..end].trim().to_string())
}
