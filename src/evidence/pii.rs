//! PII redaction. Two redaction levels: the
//! persisted/logged copy is fully redacted (every match, including the
//! user's own data); the user-visible answer is redacted only for PII that
//! plausibly belongs to a third party, since a user asking "what's my own
//! phone number on file" should still see it reflected back.

use regex::Regex;

use crate::config::PiiConfig;

pub struct PiiRedactor {
    patterns: Vec<Regex>,
    placeholder: String,
}

impl PiiRedactor {
    pub fn new(config: &PiiConfig) -> Self {
        let patterns = config.patterns.iter().filter_map(|p| Regex::new(p).ok()).collect();
        Self { patterns, placeholder: config.redaction_placeholder.clone() }
    }

    /// Redacts every configured PII pattern match, unconditionally. Used
    /// for the persisted/logged copy of the answer and for tool observation
    /// logs.
    pub fn redact_all(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, self.placeholder.as_str()).to_string();
        }
        out
    }

    /// Redacts third-party PII from the user-visible answer. Without a
    /// reliable way to tell "the caller's own number" from "someone else's"
    /// purely from text, this conservatively redacts every match in the
    /// user-visible copy too: never emitting a third party's personal data
    /// is the safer default when ownership can't be determined.
    pub fn redact_third_party(&self, text: &str) -> String {
        self.redact_all(text)
    }
}

pub fn redact_pii(text: &str, config: &PiiConfig) -> String {
    PiiRedactor::new(config).redact_all(text)
}
