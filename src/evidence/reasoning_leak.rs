//! Reasoning-leak stripping: internal ReAct scaffolding (`Thought:`,
//! `Observation:`, stock phrases the underlying model sometimes tacks on)
//! must never reach the user.

use regex::Regex;

pub struct ReasoningLeakFilter {
    line_patterns: Vec<Regex>,
    inline_patterns: Vec<Regex>,
}

impl ReasoningLeakFilter {
    pub fn new(patterns: &[String]) -> Self {
        let mut line_patterns = Vec::new();
        let mut inline_patterns = Vec::new();
        for pattern in patterns {
            let Ok(re) = Regex::new(pattern) else { continue };
            // A pattern anchored at the start of the string (`^...`) strips
            // whole lines; anything else (e.g. the literal closing phrase)
            // is removed wherever it appears.
            if pattern.starts_with('^') {
                line_patterns.push(re);
            } else {
                inline_patterns.push(re);
            }
        }
        Self { line_patterns, inline_patterns }
    }

    /// Strips every line matching a line-anchored leak pattern and every
    /// inline occurrence of a non-anchored one — the emitted answer must
    /// match none of the configured patterns.
    pub fn strip(&self, text: &str) -> String {
        let lines: Vec<&str> = text
            .lines()
            .filter(|line| !self.line_patterns.iter().any(|re| re.is_match(line.trim_start())))
            .collect();
        let mut joined = lines.join("\n");

        for re in &self.inline_patterns {
            joined = re.replace_all(&joined, "").to_string();
        }

        joined.trim().to_string()
    }
}

/// Convenience free function for callers that only need a one-off strip
/// with the default pattern set (used by tests and the recovery path).
pub fn strip_reasoning_leakage(text: &str, patterns: &[String]) -> String {
    ReasoningLeakFilter::new(patterns).strip(text)
}
