//! Entity extraction and merge semantics.
//!
//! Extraction is a small set of pattern rules, not a learned model: newest
//! non-null value per kind wins on merge, and contradictions replace prior
//! state without error. Patterns here cover Italian, English, and Indonesian
//! at a "good enough to demonstrate the contract" level; a production
//! deployment would likely delegate this to the LLM Gateway as a
//! structured-output call instead.

use std::collections::HashMap;

use crate::types::{Entity, EntityKind, EntitySnapshot};

/// Entities added or overwritten by a single `extract_and_merge` call.
pub type EntityDelta = Vec<Entity>;

/// Extracts recognizable entities from a single user turn.
pub fn extract_entities(user_text: &str, turn_index: u32) -> Vec<Entity> {
    let mut found = Vec::new();
    let lower = user_text.to_lowercase();

    // Matched against the original text, not `lower`, so the captured name
    // keeps its given casing rather than coming back all-lowercase.
    if let Some(value) = extract_name(user_text) {
        found.push(Entity { kind: EntityKind::Name, value, confidence: 0.8, turn_index });
    }

    if let Some(value) = extract_location(&lower) {
        found.push(Entity { kind: EntityKind::Location, value, confidence: 0.7, turn_index });
    }

    if let Some(value) = extract_profession(&lower) {
        found.push(Entity { kind: EntityKind::Profession, value, confidence: 0.6, turn_index });
    }

    if let Some(value) = extract_budget(&lower) {
        found.push(Entity { kind: EntityKind::Budget, value, confidence: 0.6, turn_index });
    }

    if let Some(value) = extract_preferred_language(&lower) {
        found.push(Entity { kind: EntityKind::PreferredLanguage, value, confidence: 0.9, turn_index });
    }

    if let Some(value) = extract_expertise_level(&lower) {
        found.push(Entity { kind: EntityKind::ExpertiseLevel, value, confidence: 0.6, turn_index });
    }

    found
}

/// Merges newly extracted entities into the session's running snapshot.
/// Newest non-null value per kind wins unconditionally — contradictions
/// replace prior state without error.
pub fn merge_entities(snapshot: &mut EntitySnapshot, delta: Vec<Entity>) -> EntityDelta {
    for entity in &delta {
        snapshot.insert(entity.kind, entity.clone());
    }
    delta
}

const COWORKING_KEYWORDS: &[&str] = &["coworking", "co-working", "office space", "ufficio"];
const GELATERIA_KEYWORDS: &[&str] = &["gelateria", "ice cream shop", "gelato shop"];
const RESTAURANT_KEYWORDS: &[&str] = &["restaurant", "ristorante", "warung", "cafe", "caffè"];
const VILLA_KEYWORDS: &[&str] = &["villa", "guesthouse", "hotel"];

fn extract_profession(lower: &str) -> Option<String> {
    if contains_any(lower, COWORKING_KEYWORDS) {
        Some("coworking space operator".to_string())
    } else if contains_any(lower, GELATERIA_KEYWORDS) {
        Some("gelateria owner".to_string())
    } else if contains_any(lower, RESTAURANT_KEYWORDS) {
        Some("restaurant owner".to_string())
    } else if contains_any(lower, VILLA_KEYWORDS) {
        Some("hospitality operator".to_string())
    } else {
        None
    }
}

// Each pattern captures a single word: the first token after the trigger
// phrase is taken as the name, so a trailing clause ("... and I live in
// Ubud") never gets swept into the capture.
const NAME_PATTERNS: &[&str] = &[
    r"(?i)\bmi chiamo\s+([a-zà-ÿ']+)",
    r"(?i)\bmy name is\s+([a-z']+)",
    r"(?i)\bnama saya\s+([a-z']+)",
    r"(?i)\bthis is\s+([a-z']+)\s+speaking\b",
];

fn extract_name(original_text: &str) -> Option<String> {
    for pattern in NAME_PATTERNS {
        let re = regex::Regex::new(pattern).expect("valid regex");
        if let Some(caps) = re.captures(original_text) {
            if let Some(m) = caps.get(1) {
                return Some(capitalize_words(m.as_str().trim()));
            }
        }
    }
    None
}

const BEGINNER_KEYWORDS: &[&str] = &[
    "beginner",
    "first time",
    "new to this",
    "no experience",
    "never done this before",
    "alle prime armi",
    "mai fatto prima",
    "pemula",
    "belum berpengalaman",
];
const EXPERT_KEYWORDS: &[&str] =
    &["expert", "experienced", "advanced", "professional investor", "esperto", "berpengalaman"];

fn extract_expertise_level(lower: &str) -> Option<String> {
    if contains_any(lower, BEGINNER_KEYWORDS) {
        Some("beginner".to_string())
    } else if contains_any(lower, EXPERT_KEYWORDS) {
        Some("expert".to_string())
    } else {
        None
    }
}

const LOCATIONS: &[&str] = &["canggu", "seminyak", "ubud", "denpasar", "sanur", "kuta", "uluwatu", "jakarta"];

fn extract_location(lower: &str) -> Option<String> {
    LOCATIONS.iter().find(|loc| lower.contains(**loc)).map(|loc| capitalize(loc))
}

fn extract_budget(lower: &str) -> Option<String> {
    let digits_with_unit = regex_budget();
    digits_with_unit.find(lower).map(|m| m.as_str().to_string())
}

fn regex_budget() -> regex::Regex {
    regex::Regex::new(r"\b\d[\d.,]*\s*(million|juta|miliar|billion|usd|idr|eur)\b").expect("valid regex")
}

fn extract_preferred_language(lower: &str) -> Option<String> {
    if lower.contains("in italiano") || lower.contains("parlami in italiano") {
        Some("italian".to_string())
    } else if lower.contains("in bahasa") || lower.contains("dalam bahasa indonesia") {
        Some("indonesian".to_string())
    } else if lower.contains("in english") || lower.contains("speak english") {
        Some("english".to_string())
    } else {
        None
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn capitalize_words(s: &str) -> String {
    s.split_whitespace().map(capitalize).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_profession_detects_gelateria_then_coworking() {
        let first = extract_entities("Voglio aprire una gelateria a Canggu", 1);
        assert!(first.iter().any(|e| e.kind == EntityKind::Profession && e.value.contains("gelateria")));
        assert!(first.iter().any(|e| e.kind == EntityKind::Location && e.value == "Canggu"));

        let second = extract_entities("Anzi, voglio un coworking space", 2);
        assert!(second.iter().any(|e| e.kind == EntityKind::Profession && e.value.contains("coworking")));
    }

    #[test]
    fn test_merge_newest_wins_on_contradiction() {
        let mut snapshot: EntitySnapshot = HashMap::new();
        merge_entities(&mut snapshot, extract_entities("Voglio aprire una gelateria a Canggu", 1));
        merge_entities(&mut snapshot, extract_entities("Anzi, voglio un coworking space", 2));

        let profession = snapshot.get(&EntityKind::Profession).unwrap();
        assert!(profession.value.contains("coworking"));
        assert_eq!(profession.turn_index, 2);
    }

    #[test]
    fn test_grounding_discipline_no_entity_when_nothing_said() {
        let found = extract_entities("What are the public holidays this year?", 1);
        assert!(!found.iter().any(|e| e.kind == EntityKind::Profession));
        assert!(!found.iter().any(|e| e.kind == EntityKind::Budget));
    }

    #[test]
    fn test_extract_budget() {
        let found = extract_entities("My budget is around 500 million idr", 1);
        assert!(found.iter().any(|e| e.kind == EntityKind::Budget));
    }

    #[test]
    fn test_extract_name_detects_mi_chiamo_then_recalls() {
        let found = extract_entities("Mi chiamo Marco e voglio aprire un'attività", 1);
        let name = found.iter().find(|e| e.kind == EntityKind::Name).expect("name entity");
        assert_eq!(name.value, "Marco");
    }

    #[test]
    fn test_extract_name_detects_my_name_is() {
        let found = extract_entities("Hi, my name is Sarah and I live in Ubud", 1);
        let name = found.iter().find(|e| e.kind == EntityKind::Name).expect("name entity");
        assert_eq!(name.value, "Sarah");
    }

    #[test]
    fn test_extract_name_detects_nama_saya() {
        let found = extract_entities("nama saya budi, saya tinggal di jakarta", 1);
        let name = found.iter().find(|e| e.kind == EntityKind::Name).expect("name entity");
        assert_eq!(name.value, "Budi");
    }

    #[test]
    fn test_extract_expertise_level_detects_beginner_cue() {
        let found = extract_entities("I'm a complete beginner, this is my first time investing", 1);
        let level = found.iter().find(|e| e.kind == EntityKind::ExpertiseLevel).expect("expertise entity");
        assert_eq!(level.value, "beginner");
    }

    #[test]
    fn test_extract_expertise_level_detects_expert_cue() {
        let found = extract_entities("I'm an experienced property investor looking at villas", 1);
        let level = found.iter().find(|e| e.kind == EntityKind::ExpertiseLevel).expect("expertise entity");
        assert_eq!(level.value, "expert");
    }

    #[test]
    fn test_grounding_discipline_no_name_or_expertise_when_nothing_said() {
        let found = extract_entities("What are the public holidays this year?", 1);
        assert!(!found.iter().any(|e| e.kind == EntityKind::Name));
        assert!(!found.iter().any(|e| e.kind == EntityKind::ExpertiseLevel));
    }
}
