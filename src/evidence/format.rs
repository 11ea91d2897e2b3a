//! Format enforcement: known query classes (visa, tax, company setup) get a
//! declarative heading template applied if the answer doesn't already look
//! like it matches one; procedural queries ("how do I…") must render as a
//! numbered list of at least two items.

use crate::types::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Visa,
    Tax,
    CompanySetup,
    Procedural,
    General,
}

/// Classifies the query (not the answer) into the declarative template
/// families.
pub fn detect_query_class(query_text: &str) -> QueryClass {
    let normalized = crate::utils::normalize_query(query_text);

    if is_procedural(&normalized) {
        return QueryClass::Procedural;
    }
    if ["visa", "kitas", "kitap", "sponsor", "immigration", "passport"].iter().any(|kw| normalized.contains(kw)) {
        return QueryClass::Visa;
    }
    if ["tax", "npwp", "pajak", "fiscal"].iter().any(|kw| normalized.contains(kw)) {
        return QueryClass::Tax;
    }
    if ["pt pma", "company setup", "incorporation", "business license", "kbli"].iter().any(|kw| normalized.contains(kw)) {
        return QueryClass::CompanySetup;
    }
    QueryClass::General
}

fn is_procedural(normalized: &str) -> bool {
    ["how do i", "how to", "what steps", "how can i"].iter().any(|kw| normalized.starts_with(kw) || normalized.contains(kw))
}

/// Applies the template for `class` if the answer doesn't already match
/// one, returning the (possibly reformatted) text and the template name
/// attached, if any, for `EvidencePack.format_template`. Templates are
/// declarative section lists, not prose rewrites — when the answer already
/// contains the required heading the text passes through untouched.
pub fn apply_format_template(answer_text: &str, class: QueryClass, tier: Tier) -> (String, Option<String>) {
    match class {
        QueryClass::Procedural => {
            let formatted = ensure_numbered_list(answer_text);
            (formatted, Some("procedural_numbered_list".to_string()))
        }
        QueryClass::Visa if tier != Tier::Greeting => {
            (ensure_heading(answer_text, "Visa / Immigration"), Some("visa_template".to_string()))
        }
        QueryClass::Tax if tier != Tier::Greeting => {
            (ensure_heading(answer_text, "Tax"), Some("tax_template".to_string()))
        }
        QueryClass::CompanySetup if tier != Tier::Greeting => {
            (ensure_heading(answer_text, "Company Setup"), Some("company_setup_template".to_string()))
        }
        _ => (answer_text.to_string(), None),
    }
}

/// Leaves text alone if it already contains what looks like a numbered
/// list (a line starting with `1.`/`1)`); otherwise splits on sentence
/// boundaries and renders each as a numbered item, guaranteeing at least
/// two items when the source has that much content.
fn ensure_numbered_list(text: &str) -> String {
    let already_numbered = text.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed.starts_with("1.") || trimmed.starts_with("1)")
    });
    if already_numbered {
        return text.to_string();
    }

    let sentences: Vec<&str> = text
        .split(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.len() < 2 {
        return text.to_string();
    }

    sentences
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}.", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prepends a markdown heading unless the text already starts with one.
fn ensure_heading(text: &str, heading: &str) -> String {
    if text.trim_start().starts_with('#') {
        return text.to_string();
    }
    format!("## {heading}\n\n{text}")
}
