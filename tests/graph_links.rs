//! Knowledge graph and link integration tests.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use contextkeep::models::{
    ItemFilter, ItemRef, ItemType, LinkQuery, NewCustomDatum, NewDecision, NewLink, NewProgress,
    NewSystemPattern, ProgressUpdate,
};
use contextkeep::{ContextKeepConfig, KnowledgeItem, SearchFilter, SearchMode, ServiceContainer, WorkspaceId};
use serde_json::json;

fn setup() -> (ServiceContainer, WorkspaceId) {
    (
        ServiceContainer::new(ContextKeepConfig::in_memory()).expect("services"),
        WorkspaceId::new("graph").expect("workspace id"),
    )
}

#[test]
fn test_link_is_visible_from_both_endpoints() {
    let (services, ws) = setup();
    let graph = services.graph();
    let decision = graph
        .log_decision(&ws, NewDecision::new("Use the repository pattern for data access"))
        .unwrap()
        .item;
    graph
        .log_system_pattern(&ws, NewSystemPattern::new("Repository Pattern"))
        .unwrap();

    let id = decision.id.to_string();
    graph
        .link(
            &ws,
            &NewLink::new(
                ("decision", id.as_str()),
                ("system_pattern", "Repository Pattern"),
                "implements",
            ),
        )
        .unwrap();

    let from_decision = graph
        .get_linked_items(&ws, &LinkQuery::new("decision", id.as_str()))
        .unwrap();
    assert_eq!(from_decision.len(), 1);
    assert_eq!(from_decision[0].relationship_type, "implements");
    assert_eq!(
        from_decision[0].other_endpoint("decision", &id),
        ("system_pattern", "Repository Pattern")
    );

    let from_pattern = graph
        .get_linked_items(&ws, &LinkQuery::new("system_pattern", "Repository Pattern"))
        .unwrap();
    assert_eq!(from_pattern.len(), 1);
    assert_eq!(
        from_pattern[0].other_endpoint("system_pattern", "Repository Pattern"),
        ("decision", id.as_str())
    );
}

#[test]
fn test_link_query_filters() {
    let (services, ws) = setup();
    let graph = services.graph();
    graph
        .link(&ws, &NewLink::new(("decision", "1"), ("progress_entry", "2"), "tracks"))
        .unwrap();
    graph
        .link(&ws, &NewLink::new(("decision", "1"), ("system_pattern", "Cache"), "implements"))
        .unwrap();

    let implements = graph
        .get_linked_items(&ws, &LinkQuery::new("decision", "1").with_relationship("implements"))
        .unwrap();
    assert_eq!(implements.len(), 1);

    let progress = graph
        .get_linked_items(&ws, &LinkQuery::new("decision", "1").with_linked_type("progress_entry"))
        .unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].relationship_type, "tracks");

    let all = graph
        .get_linked_items(&ws, &LinkQuery::new("decision", "1"))
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].id > all[1].id || all[0].timestamp > all[1].timestamp);

    graph.delete_link(&ws, all[0].id).unwrap();
    assert!(graph.delete_link(&ws, all[0].id).unwrap_err().is_not_found());
}

#[test]
fn test_deleted_item_leaves_search_but_links_remain() {
    let (services, ws) = setup();
    let graph = services.graph();
    let decision = graph
        .log_decision(&ws, NewDecision::new("Adopt event sourcing"))
        .unwrap()
        .item;
    let id = decision.id.to_string();
    graph
        .link(&ws, &NewLink::new(("decision", id.as_str()), ("system_pattern", "Event Log"), "implements"))
        .unwrap();

    let before = services
        .search()
        .search(&ws, "event sourcing", SearchMode::Lexical, &SearchFilter::new())
        .unwrap();
    assert_eq!(before.len(), 1);

    let outcome = graph
        .delete(&ws, ItemRef::new(ItemType::Decision, decision.id))
        .unwrap();
    assert!(!outcome.index_cleanup_pending);

    for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
        let hits = services
            .search()
            .search(&ws, "event sourcing", mode, &SearchFilter::new())
            .unwrap();
        assert!(hits.is_empty(), "{mode} still returns the deleted item");
    }
    assert_eq!(
        graph
            .get_linked_items(&ws, &LinkQuery::new("decision", id))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_progress_auto_link_and_update() {
    let (services, ws) = setup();
    let graph = services.graph();
    let logged = graph
        .log_progress(
            &ws,
            NewProgress::new("IN_PROGRESS", "Implement the hybrid search endpoint").linked_to("decision", "7"),
        )
        .unwrap()
        .item;
    let link = logged.link.expect("auto link");
    assert_eq!(link.relationship_type, "relates_to_progress");
    assert_eq!(link.target_item_type, "decision");
    assert_eq!(link.target_item_id, "7");
    assert!(
        link.description
            .as_deref()
            .unwrap()
            .starts_with("Progress entry 'Implement the hybrid search en...'")
    );

    let update = ProgressUpdate {
        status: Some("DONE".to_string()),
        ..ProgressUpdate::default()
    };
    let updated = graph.update_progress(&ws, logged.entry.id, &update).unwrap().item;
    assert_eq!(updated.status, "DONE");
    assert_eq!(updated.description, logged.entry.description);

    let err = graph.update_progress(&ws, 999, &update).unwrap_err();
    assert!(err.is_not_found());

    let done = graph
        .get_progress(&ws, &ItemFilter::new().with_status("DONE"))
        .unwrap();
    assert_eq!(done.len(), 1);
}

#[test]
fn test_pattern_and_custom_data_upsert_keep_ids() {
    let (services, ws) = setup();
    let graph = services.graph();
    let first = graph
        .log_system_pattern(&ws, NewSystemPattern::new("Repository Pattern"))
        .unwrap()
        .item;
    let second = graph
        .log_system_pattern(
            &ws,
            NewSystemPattern::new("Repository Pattern").with_description("x".repeat(600)),
        )
        .unwrap()
        .item;
    assert_eq!(first.id, second.id);
    assert_eq!(graph.get_system_patterns(&ws, &ItemFilter::new()).unwrap().len(), 1);

    let a = graph
        .log_custom_data(&ws, NewCustomDatum::new("Architecture", "layers", json!(["api", "core"])))
        .unwrap()
        .item;
    let b = graph
        .log_custom_data(&ws, NewCustomDatum::new("Architecture", "layers", json!(["api"])))
        .unwrap()
        .item;
    assert_eq!(a.id, b.id);
    let stored = graph
        .get_custom_data(&ws, Some("Architecture"), Some("layers"))
        .unwrap();
    assert_eq!(stored[0].value, json!(["api"]));
}

#[test]
fn test_custom_data_lookup_errors() {
    let (services, ws) = setup();
    let graph = services.graph();
    assert!(graph.get_custom_data(&ws, None, Some("k")).unwrap_err().is_invalid_input());
    assert!(graph.get_custom_data(&ws, Some("c"), Some("k")).unwrap_err().is_not_found());
    assert!(graph.get_custom_data(&ws, Some("c"), None).unwrap().is_empty());
}

#[test]
fn test_tag_filters_and_ordering() {
    let (services, ws) = setup();
    let graph = services.graph();
    graph
        .log_decision(&ws, NewDecision::new("first").with_tags(["db"]))
        .unwrap();
    graph
        .log_decision(&ws, NewDecision::new("second").with_tags(["db", "perf"]))
        .unwrap();
    graph
        .log_decision(&ws, NewDecision::new("third").with_tags(["ui"]))
        .unwrap();

    let all = graph.get_decisions(&ws, &ItemFilter::new()).unwrap();
    let summaries: Vec<_> = all.iter().map(|d| d.summary.as_str()).collect();
    assert_eq!(summaries, vec!["third", "second", "first"]);

    let both = graph
        .get_decisions(&ws, &ItemFilter::new().with_all_tags(["db", "perf"]))
        .unwrap();
    assert_eq!(both.len(), 1);

    let any = graph
        .get_decisions(&ws, &ItemFilter::new().with_any_tags(["perf", "ui"]))
        .unwrap();
    assert_eq!(any.len(), 2);

    let conflicting = ItemFilter::new().with_all_tags(["a"]).with_any_tags(["b"]);
    assert!(graph.get_decisions(&ws, &conflicting).unwrap_err().is_invalid_input());
}

#[test]
fn test_batch_log_reports_each_element() {
    let (services, ws) = setup();
    let report = services
        .graph()
        .batch_log(
            &ws,
            "system_pattern",
            vec![
                json!({"name": "CQRS"}),
                json!({"description": "missing name"}),
                json!({"name": "Outbox", "tags": ["messaging"]}),
            ],
        )
        .unwrap();
    assert_eq!(report.logged_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert!(!report.results[1].is_logged());

    let item = services
        .graph()
        .get_item(&ws, ItemRef::new(ItemType::SystemPattern, 2))
        .unwrap();
    assert!(matches!(item, KnowledgeItem::SystemPattern(p) if p.name == "Outbox"));
}
