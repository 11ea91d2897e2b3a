//! Query Router (C2).
//!
//! Classifies a query into a [`Tier`] and selects which collections it may
//! search, producing a [`RouteDecision`]. Deliberately simple pattern
//! matching rather than a learned classifier: tier classification only
//! needs to be coarse, and a fixed-rule router is the cheapest thing that
//! guarantees greeting skip and a tier-appropriate iteration budget.

use std::collections::HashMap;

use crate::config::{CollectionConfig, RouterConfig};
use crate::types::{Principal, RouteDecision, Tier};

/// Selects a [`Tier`] and a set of authorized [`Collection`]s for a query.
pub struct QueryRouter {
    router_config: RouterConfig,
    collections: HashMap<String, CollectionConfig>,
    max_iterations_per_tier: HashMap<String, u32>,
}

impl QueryRouter {
    pub fn new(
        router_config: RouterConfig,
        collections: HashMap<String, CollectionConfig>,
        max_iterations_per_tier: HashMap<String, u32>,
    ) -> Self {
        Self { router_config, collections, max_iterations_per_tier }
    }

    /// Full route decision for a query: tier, authorized collections, tool
    /// availability, and iteration budget.
    pub fn route(&self, text: &str, principal: &Principal) -> RouteDecision {
        let tier = self.classify_tier(text);
        let collections = self.select_collections(text, principal, tier);
        let tools_enabled = tier != Tier::Greeting;
        let max_iterations = self.max_iterations_for(tier);

        RouteDecision {
            tier,
            collections,
            tools_enabled,
            max_iterations,
            model_tier: tier,
        }
    }

    /// A short, pattern-matching message (a greeting or thanks, under the
    /// configured token budget) short-circuits to `Greeting` with zero
    /// iterations. Anything else defaults to `pro` rather than guessing at
    /// `fast`: ambiguity should not silently under-provision compute.
    fn classify_tier(&self, text: &str) -> Tier {
        let normalized = crate::utils::normalize_query(text);
        let word_count = normalized.split_whitespace().count();

        if word_count > 0
            && word_count <= self.router_config.greeting_max_tokens
            && self
                .router_config
                .greeting_patterns
                .iter()
                .any(|pattern| normalized.contains(&pattern.to_lowercase()))
        {
            return Tier::Greeting;
        }

        if is_simple_factual(&normalized) {
            return Tier::Fast;
        }

        if is_deep_query(&normalized) {
            return Tier::Deep;
        }

        self.router_config.default_tier
    }

    /// Collections are chosen by keyword cue and filtered by the principal's
    /// role, then ordered by configured precedence.
    fn select_collections(&self, text: &str, principal: &Principal, tier: Tier) -> Vec<String> {
        if tier == Tier::Greeting {
            return Vec::new();
        }

        let normalized = crate::utils::normalize_query(text);

        let mut matched: Vec<(&String, &CollectionConfig)> = self
            .collections
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .filter(|(_, cfg)| match &cfg.role_required {
                Some(role) => principal.has_role(role),
                None => true,
            })
            .filter(|(name, _)| collection_matches_query(name, &normalized))
            .collect();

        if matched.is_empty() {
            matched = self
                .collections
                .iter()
                .filter(|(_, cfg)| cfg.enabled)
                .filter(|(_, cfg)| match &cfg.role_required {
                    Some(role) => principal.has_role(role),
                    None => true,
                })
                .collect();
        }

        matched.sort_by_key(|(name, cfg)| (-cfg.precedence, name.to_string()));
        matched.into_iter().map(|(name, _)| name.clone()).collect()
    }

    fn max_iterations_for(&self, tier: Tier) -> u32 {
        let key = tier_key(tier);
        self.max_iterations_per_tier
            .get(key)
            .copied()
            .unwrap_or_else(|| tier.default_max_iterations())
    }
}

fn tier_key(tier: Tier) -> &'static str {
    match tier {
        Tier::Greeting => "greeting",
        Tier::Fast => "fast",
        Tier::Pro => "pro",
        Tier::Deep => "deep",
    }
}

/// Collection names are matched if they (or a known keyword family for them)
/// appear in the normalized query text.
fn collection_matches_query(collection: &str, normalized_text: &str) -> bool {
    if normalized_text.contains(collection) {
        return true;
    }
    match collection {
        "visa" => ["kitas", "visa", "immigration", "passport", "sponsor"]
            .iter()
            .any(|kw| normalized_text.contains(kw)),
        "tax" => ["tax", "npwp", "pajak", "fiscal"].iter().any(|kw| normalized_text.contains(kw)),
        "legal" => ["legal", "license", "licence", "kbli", "contract", "notary"]
            .iter()
            .any(|kw| normalized_text.contains(kw)),
        "company_setup" => ["pt pma", "company", "business setup", "incorporation"]
            .iter()
            .any(|kw| normalized_text.contains(kw)),
        _ => false,
    }
}

fn is_simple_factual(normalized: &str) -> bool {
    let word_count = normalized.split_whitespace().count();
    word_count <= 8
        && ["what is", "how much", "cost of", "price of", "when does"]
            .iter()
            .any(|prefix| normalized.starts_with(prefix))
}

fn is_deep_query(normalized: &str) -> bool {
    let word_count = normalized.split_whitespace().count();
    word_count > 40
        || ["compare", "step by step", "comprehensive", "in detail", "all the options"]
            .iter()
            .any(|kw| normalized.contains(kw))
}
