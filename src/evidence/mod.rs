//! Evidence & Output Pipeline (C8): citation binding, format enforcement,
//! PII redaction, and verification scoring over a finalized answer. Uses
//! plain `String`/`regex`-based text transforms, in keeping with
//! `utils.rs`'s SSE text handling.
//!
//! This pipeline never fails the request: a degraded score or empty
//! citation list is always preferable to a 5xx. The one exception,
//! PII-redaction failure being a hard error for persistence, is enforced by
//! the caller (the orchestrator) rather than by this module, since only the
//! caller knows whether it is about to persist or merely stream.

mod format;
mod pii;
mod reasoning_leak;
mod verification;

use crate::config::{OrchestratorConfig, PiiConfig};
use crate::types::{Citation, EvidencePack, ScoredChunk, Tier};

pub use format::{apply_format_template, detect_query_class, QueryClass};
pub use pii::{redact_pii, PiiRedactor};
pub use reasoning_leak::{strip_reasoning_leakage, ReasoningLeakFilter};
pub use verification::compute_verification_score;

/// Runs the full finalize-time pipeline over a raw model answer and the
/// chunks retrieved for this turn.
pub struct EvidencePipeline {
    leak_filter: ReasoningLeakFilter,
    pii_redactor: PiiRedactor,
    output_min_chars: usize,
}

impl EvidencePipeline {
    pub fn new(orchestrator_config: &OrchestratorConfig, pii_config: &PiiConfig) -> Self {
        Self {
            leak_filter: ReasoningLeakFilter::new(&orchestrator_config.reasoning_leak_patterns),
            pii_redactor: PiiRedactor::new(pii_config),
            output_min_chars: orchestrator_config.output_min_chars,
        }
    }

    /// Orchestrator-side step: strip reasoning leakage before anything
    /// downstream sees the text. Returns `None` if the
    /// filtered text is empty or degenerate, signaling the orchestrator
    /// must synthesize a recovery turn.
    pub fn filter_reasoning_leak(&self, raw_answer: &str) -> Option<String> {
        let filtered = self.leak_filter.strip(raw_answer);
        let non_whitespace = filtered.chars().filter(|c| !c.is_whitespace()).count();
        if non_whitespace < self.output_min_chars {
            None
        } else {
            Some(filtered)
        }
    }

    /// Citation binding, format enforcement, PII redaction, verification
    /// scoring. `tier` and `query_text` drive format template selection;
    /// `retrieved` is every chunk surfaced to the model this turn, so
    /// citation binding can only reference chunks genuinely retrieved this
    /// same turn.
    pub fn finalize(
        &self,
        answer_text: &str,
        query_text: &str,
        retrieved: &[ScoredChunk],
        tier: Tier,
    ) -> EvidencePack {
        let citations = bind_citations(answer_text, retrieved);
        let query_class = detect_query_class(query_text);
        let (formatted, format_template) = apply_format_template(answer_text, query_class, tier);
        let user_visible = self.pii_redactor.redact_third_party(&formatted);
        let score = compute_verification_score(&user_visible, &citations, retrieved);

        EvidencePack {
            answer_text: user_visible,
            citations,
            verification_score: score,
            format_template,
        }
    }

    /// Full redaction (including the user's own PII) for the persisted/logged
    /// copy of the answer and for tool observation logs. Failure here is a
    /// hard error the caller must treat as blocking
    /// persistence, not a degrade-and-continue path.
    pub fn redact_for_persistence(&self, text: &str) -> String {
        self.pii_redactor.redact_all(text)
    }
}

/// Binds claim-like spans to retrieved chunks by lexical overlap: a
/// citation is produced for each retrieved chunk whose text shares enough
/// vocabulary with the answer to plausibly have grounded part of it.
/// Unbound answers (no overlap with anything retrieved) get an empty
/// citation list rather than a guessed one — every citation must reference
/// a chunk retrieved this turn.
fn bind_citations(answer_text: &str, retrieved: &[ScoredChunk]) -> Vec<Citation> {
    let answer_tokens = content_words(answer_text);
    if answer_tokens.is_empty() {
        return Vec::new();
    }

    let mut citations = Vec::new();
    for scored in retrieved {
        let chunk_tokens = content_words(&scored.chunk.text);
        let overlap = chunk_tokens.intersection(&answer_tokens).count();
        if overlap == 0 {
            continue;
        }
        let overlap_ratio = overlap as f32 / chunk_tokens.len().max(1) as f32;
        if overlap_ratio < 0.08 {
            continue;
        }
        citations.push(Citation {
            id: scored.chunk.chunk_id.clone(),
            title: scored.chunk.metadata.document_id.clone(),
            excerpt: excerpt(&scored.chunk.text, 200),
            parent_id: scored.chunk.parent_id.clone(),
        });
    }
    citations
}

fn content_words(text: &str) -> std::collections::HashSet<String> {
    crate::utils::normalize_query(text)
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}
