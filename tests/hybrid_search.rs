//! Lexical, semantic and hybrid search integration tests.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use contextkeep::models::{NewCustomDatum, NewDecision, NewSystemPattern};
use contextkeep::{
    ContextKeepConfig, ItemType, KnowledgeItem, SearchFilter, SearchMode, ServiceContainer,
    WorkspaceId,
};
use serde_json::json;
use test_case::test_case;

fn seeded() -> (ServiceContainer, WorkspaceId) {
    let services = ServiceContainer::new(ContextKeepConfig::in_memory()).expect("services");
    let ws = WorkspaceId::new("search").expect("workspace id");
    let graph = services.graph();

    graph
        .log_decision(
            &ws,
            NewDecision::new("Use Redis for response caching")
                .with_rationale("Redis keeps hot API responses in memory")
                .with_tags(["cache", "perf"]),
        )
        .unwrap();
    graph
        .log_decision(&ws, NewDecision::new("Render the dashboard with React").with_tags(["ui"]))
        .unwrap();
    graph
        .log_decision(&ws, NewDecision::new("Store audit events in Postgres").with_tags(["db"]))
        .unwrap();
    graph
        .log_system_pattern(
            &ws,
            NewSystemPattern::new("Cache Aside").with_description("Read through Redis before the database"),
        )
        .unwrap();
    graph
        .log_custom_data(
            &ws,
            NewCustomDatum::new("Architecture", "cache_layers", json!({"l1": "memory", "l2": "redis"})),
        )
        .unwrap();
    graph
        .log_custom_data(&ws, NewCustomDatum::new("Glossary", "redis", json!("An in-memory data store")))
        .unwrap();
    (services, ws)
}

fn search(services: &ServiceContainer, ws: &WorkspaceId, query: &str, mode: SearchMode, filter: &SearchFilter) -> Vec<contextkeep::SearchHit> {
    services.search().search(ws, query, mode, filter).unwrap()
}

#[test_case(SearchMode::Lexical ; "lexical")]
#[test_case(SearchMode::Semantic ; "semantic")]
#[test_case(SearchMode::Hybrid ; "hybrid")]
fn test_results_are_sorted_by_score(mode: SearchMode) {
    let (services, ws) = seeded();
    let hits = search(&services, &ws, "redis caching", mode, &SearchFilter::new());
    assert!(!hits.is_empty());
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_hybrid_scores_are_bounded_and_carry_raw_scores() {
    let (services, ws) = seeded();
    let hits = search(&services, &ws, "redis caching", SearchMode::Hybrid, &SearchFilter::new());
    assert!(!hits.is_empty());
    for hit in &hits {
        assert!((0.0..=1.0 + 1e-6).contains(&hit.score));
        assert!(hit.lexical_score.is_some() || hit.semantic_score.is_some());
    }

    // The decision matches both words lexically and ranks first.
    match &hits[0].item {
        KnowledgeItem::Decision(d) => assert_eq!(d.summary, "Use Redis for response caching"),
        other => panic!("unexpected top hit: {other:?}"),
    }
    assert!(hits[0].lexical_score.is_some());
    assert!(hits[0].semantic_score.is_some());
}

#[test]
fn test_tag_filter_applies_before_truncation() {
    let (services, ws) = seeded();
    let filter = SearchFilter::new().with_any_tags(["db"]).with_limit(1);
    let hits = search(&services, &ws, "redis audit events", SearchMode::Hybrid, &filter);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].item.tags().contains(&"db".to_string()));
}

#[test]
fn test_category_filter_restricts_to_custom_data() {
    let (services, ws) = seeded();
    let filter = SearchFilter::new().with_category("Glossary");
    let hits = search(&services, &ws, "redis", SearchMode::Hybrid, &filter);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.item_type(), ItemType::CustomData);
    assert_eq!(hits[0].item.category(), Some("Glossary"));
}

#[test]
fn test_item_type_filter_is_pushed_down() {
    let (services, ws) = seeded();
    let filter = SearchFilter::new().with_item_type(ItemType::SystemPattern);
    for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
        let hits = search(&services, &ws, "redis", mode, &filter);
        assert!(hits.iter().all(|h| h.item.item_type() == ItemType::SystemPattern));
    }
}

#[test_case(SearchFilter::new().with_limit(0) ; "zero limit")]
#[test_case(SearchFilter::new().with_limit(101) ; "limit above maximum")]
#[test_case(SearchFilter::new().with_all_tags(["a"]).with_any_tags(["b"]) ; "conflicting tag filters")]
#[test_case(SearchFilter::new().with_item_type(ItemType::Decision).with_category("Glossary") ; "category without custom data")]
fn test_invalid_filters_are_rejected(filter: SearchFilter) {
    let (services, ws) = seeded();
    let err = services
        .search()
        .search(&ws, "redis", SearchMode::Hybrid, &filter)
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn test_default_limit_applies() {
    let services = ServiceContainer::new(ContextKeepConfig::in_memory()).unwrap();
    let ws = WorkspaceId::new("many").unwrap();
    for i in 0..15 {
        services
            .graph()
            .log_decision(&ws, NewDecision::new(format!("queue consumer {i}")))
            .unwrap();
    }
    let hits = search(&services, &ws, "queue", SearchMode::Lexical, &SearchFilter::new());
    assert_eq!(hits.len(), 10);
}

#[test]
fn test_empty_workspace_returns_nothing() {
    let services = ServiceContainer::new(ContextKeepConfig::in_memory()).unwrap();
    let ws = WorkspaceId::new("empty").unwrap();
    assert!(search(&services, &ws, "anything", SearchMode::Hybrid, &SearchFilter::new()).is_empty());
}

/// One tagged decision that ranks below `crowd` untagged, higher-scoring ones.
fn buried_match(crowd: usize) -> (ServiceContainer, WorkspaceId) {
    let services = ServiceContainer::new(ContextKeepConfig::in_memory()).unwrap();
    let ws = WorkspaceId::new("buried").unwrap();
    let filler = "the schema migration plan covers replicas backups retention and failover ".repeat(20);
    services
        .graph()
        .log_decision(
            &ws,
            NewDecision::new("Partition the event tables")
                .with_rationale(format!("{filler} storage {filler}"))
                .with_tags(["db"]),
        )
        .unwrap();
    for i in 0..crowd {
        services
            .graph()
            .log_decision(&ws, NewDecision::new(format!("storage storage storage {i}")))
            .unwrap();
    }
    (services, ws)
}

#[test_case(SearchMode::Lexical ; "lexical")]
#[test_case(SearchMode::Semantic ; "semantic")]
#[test_case(SearchMode::Hybrid ; "hybrid")]
fn test_tag_filter_finds_match_beyond_candidate_pool(mode: SearchMode) {
    let (services, ws) = buried_match(210);
    let filter = SearchFilter::new().with_any_tags(["db"]);
    let hits = search(&services, &ws, "storage", mode, &filter);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.tags(), ["db".to_string()]);
}

#[test]
fn test_category_filter_finds_match_beyond_candidate_pool() {
    let services = ServiceContainer::new(ContextKeepConfig::in_memory()).unwrap();
    let ws = WorkspaceId::new("buried_data").unwrap();
    let graph = services.graph();
    let filler = "replicas backups retention and failover ".repeat(40);
    graph
        .log_custom_data(&ws, NewCustomDatum::new("Specifications", "storage", json!(filler)))
        .unwrap();
    for i in 0..210 {
        graph
            .log_custom_data(
                &ws,
                NewCustomDatum::new("Notes", format!("note_{i}"), json!("storage storage storage")),
            )
            .unwrap();
    }

    let filter = SearchFilter::new().with_category("Specifications").with_limit(5);
    let hits = search(&services, &ws, "storage", SearchMode::Lexical, &filter);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.category(), Some("Specifications"));
}
