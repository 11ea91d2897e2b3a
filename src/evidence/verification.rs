//! Verification score: a bounded `[0,1]` metric
//! combining citation coverage of the answer, agreement between the top
//! retrieval score and the answer, and absence of hedged/confabulated
//! phrasing.

use crate::types::{Citation, ScoredChunk};

const HEDGE_PHRASES: &[&str] = &[
    "i think",
    "i believe",
    "probably",
    "i'm not sure",
    "i am not sure",
    "as far as i know",
    "it is possible that",
];

/// Weighted blend of three signals, each already normalized to `[0,1]`:
/// citation coverage (40%), top retrieval agreement (40%), and the absence
/// of hedged language (20%). Bounded to `[0,1]` by construction since every
/// input term already is.
pub fn compute_verification_score(answer_text: &str, citations: &[Citation], retrieved: &[ScoredChunk]) -> f32 {
    let coverage = citation_coverage(answer_text, citations);
    let agreement = retrieval_agreement(retrieved);
    let hedge_penalty = hedge_free_score(answer_text);

    (0.4 * coverage + 0.4 * agreement + 0.2 * hedge_penalty).clamp(0.0, 1.0)
}

/// Fraction of the answer's content words that appear in at least one
/// citation excerpt — a cheap proxy for "how much of this answer is
/// actually grounded in a cited source".
fn citation_coverage(answer_text: &str, citations: &[Citation]) -> f32 {
    if citations.is_empty() {
        return 0.0;
    }
    let answer_words: Vec<String> = crate::utils::normalize_query(answer_text)
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect();
    if answer_words.is_empty() {
        return 0.0;
    }

    let cited_text: String = citations.iter().map(|c| c.excerpt.as_str()).collect::<Vec<_>>().join(" ");
    let cited_words: std::collections::HashSet<String> =
        crate::utils::normalize_query(&cited_text).split_whitespace().map(str::to_string).collect();

    let covered = answer_words.iter().filter(|w| cited_words.contains(*w)).count();
    covered as f32 / answer_words.len() as f32
}

/// How confident retrieval itself was in what it surfaced: the top
/// rerank/relevance score, scaled down when nothing was retrieved at all.
fn retrieval_agreement(retrieved: &[ScoredChunk]) -> f32 {
    retrieved
        .iter()
        .map(|c| c.rerank_score.unwrap_or(c.relevance_score))
        .fold(None, |acc: Option<f32>, score| Some(acc.map_or(score, |a| a.max(score))))
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

fn hedge_free_score(answer_text: &str) -> f32 {
    let lower = answer_text.to_lowercase();
    let hedges = HEDGE_PHRASES.iter().filter(|p| lower.contains(*p)).count();
    if hedges == 0 {
        1.0
    } else {
        (1.0 - 0.3 * hedges as f32).max(0.0)
    }
}
