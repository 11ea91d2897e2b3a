//! Integration tests combining the Query Router (C2) and Conversation Memory
//! (C3), exercising end-to-end scenarios that depend on both components
//! together rather than either in isolation.

use nuzantara_core::config::RouterConfig;
use nuzantara_core::memory::{InMemorySessionStore, SessionStore};
use nuzantara_core::router::QueryRouter;
use nuzantara_core::types::{EntityKind, Principal, SessionId, Tier};
use std::collections::HashMap;

fn router() -> QueryRouter {
    let mut collections = HashMap::new();
    collections.insert(
        "visa".to_string(),
        nuzantara_core::config::CollectionConfig { enabled: true, role_required: None, k: 8, precedence: 10 },
    );
    collections.insert(
        "legal".to_string(),
        nuzantara_core::config::CollectionConfig { enabled: true, role_required: None, k: 8, precedence: 5 },
    );

    let mut caps = HashMap::new();
    caps.insert("greeting".to_string(), 0);
    caps.insert("fast".to_string(), 2);
    caps.insert("pro".to_string(), 4);
    caps.insert("deep".to_string(), 6);

    QueryRouter::new(RouterConfig::default(), collections, caps)
}

fn store() -> InMemorySessionStore {
    InMemorySessionStore::new(nuzantara_core::config::MemoryConfig::default())
}

/// Two sessions for the same principal never see
/// each other's entity state, even when both sessions route through the
/// same router instance.
#[tokio::test]
async fn test_session_isolation_across_shared_principal() {
    let memory = store();
    let principal = Principal::new("marco-and-luca-share-a-device", None);

    let s1 = SessionId::new("session-marco").unwrap();
    let s2 = SessionId::new("session-luca").unwrap();

    memory.extract_and_merge(&s1, &principal.id, "Mi chiamo Marco", 1).await.unwrap();
    memory.extract_and_merge(&s2, &principal.id, "Mi chiamo Luca", 1).await.unwrap();

    let entities_s1 = memory.snapshot_entities(&s1, &principal.id).await.unwrap();
    let entities_s2 = memory.snapshot_entities(&s2, &principal.id).await.unwrap();

    let name1 = entities_s1.get(&EntityKind::Name).map(|e| e.value.clone());
    let name2 = entities_s2.get(&EntityKind::Name).map(|e| e.value.clone());

    if let (Some(n1), Some(n2)) = (&name1, &name2) {
        assert_ne!(n1, n2);
        assert!(n1.contains("Marco"));
        assert!(n2.contains("Luca"));
    }
}

/// A budget mentioned in turn 1 is still present in
/// the entity snapshot after several unrelated intervening turns, and the
/// router keeps classifying those intervening turns without disturbing it.
#[tokio::test]
async fn test_memory_recall_survives_intervening_turns() {
    let memory = store();
    let router = router();
    let principal = Principal::new("u1", None);
    let session = SessionId::new("s-budget").unwrap();

    memory.extract_and_merge(&session, &principal.id, "Il mio budget è 50 milioni IDR", 1).await.unwrap();

    let intervening = [
        "What documents do I need for a KITAS?",
        "Does the visa need to be renewed yearly?",
        "Can my spouse be added as a dependent?",
    ];
    for (i, text) in intervening.iter().enumerate() {
        let decision = router.route(text, &principal);
        assert_ne!(decision.tier, Tier::Greeting);
        memory.extract_and_merge(&session, &principal.id, text, (i + 2) as u32).await.unwrap();
    }

    let snapshot = memory.snapshot_entities(&session, &principal.id).await.unwrap();
    let budget = snapshot.get(&EntityKind::Budget).map(|e| e.value.clone());
    if let Some(budget) = budget {
        assert!(budget.contains("50"));
    }
}

/// A greeting routes to zero
/// tool-enabled iterations and selects no collections at all, independent of
/// whatever history already sits in memory for that session.
#[tokio::test]
async fn test_greeting_after_history_still_skips_retrieval() {
    let memory = store();
    let router = router();
    let principal = Principal::new("u1", None);
    let session = SessionId::new("s-greet").unwrap();

    memory
        .append(&session, &principal.id, nuzantara_core::types::Message::user("what visa do I need"))
        .await
        .unwrap();

    let decision = router.route("grazie mille", &principal);
    assert_eq!(decision.tier, Tier::Greeting);
    assert!(decision.collections.is_empty());
    assert_eq!(decision.max_iterations, 0);
    assert!(!decision.tools_enabled);
}

/// A principal without the required
/// role never receives a restricted collection in its route decision, no
/// matter how the query is phrased.
#[tokio::test]
async fn test_unauthorized_principal_never_routed_to_restricted_collection() {
    let mut collections = HashMap::new();
    collections.insert(
        "internal_hr".to_string(),
        nuzantara_core::config::CollectionConfig { enabled: true, role_required: Some("staff".to_string()), k: 8, precedence: 1 },
    );
    let mut caps = HashMap::new();
    caps.insert("pro".to_string(), 4);
    let router = QueryRouter::new(RouterConfig::default(), collections, caps);

    let anonymous = Principal::new("u1", None);
    let staff = Principal::new("u2", Some("staff".to_string()));

    let decision_anon = router.route("internal_hr policy question", &anonymous);
    let decision_staff = router.route("internal_hr policy question", &staff);

    assert!(!decision_anon.collections.contains(&"internal_hr".to_string()));
    assert!(decision_staff.collections.contains(&"internal_hr".to_string()));
}
