//! Property-based tests for documents, workspace ids and context packing.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Patches set and delete exactly the keys they name
//! - Every document write bumps the version by one
//! - Workspace ids map to stable, distinct storage keys
//! - Dynamic context never exceeds its budget

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use contextkeep::models::{
    DocumentContent, DocumentPatch, HistoryQuery, NewDecision, apply_patch,
};
use contextkeep::services::estimate_tokens;
use contextkeep::{
    ContextKeepConfig, ContextKind, ContextUpdate, PatchOp, ServiceContainer, WorkspaceId,
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn patch_op() -> impl Strategy<Value = PatchOp> {
    prop_oneof![
        (0i64..100).prop_map(|n| PatchOp::Set(json!(n))),
        "[a-z]{0,8}".prop_map(|s| PatchOp::Set(Value::String(s))),
        Just(PatchOp::Delete),
    ]
}

fn document() -> impl Strategy<Value = DocumentContent> {
    proptest::collection::btree_map("[a-e]", 0i64..100, 0..5)
        .prop_map(|m| m.into_iter().map(|(k, v)| (k, json!(v))).collect())
}

proptest! {
    /// Property: a patch touches only its own keys.
    #[test]
    fn prop_patch_touches_only_named_keys(
        current in document(),
        patch in proptest::collection::btree_map("[a-h]", patch_op(), 0..6),
    ) {
        let patch: DocumentPatch = patch;
        let next = apply_patch(&current, &patch);

        for (key, op) in &patch {
            match op {
                PatchOp::Set(value) => prop_assert_eq!(next.get(key), Some(value)),
                PatchOp::Delete => prop_assert!(!next.contains_key(key)),
            }
        }
        for (key, value) in &current {
            if !patch.contains_key(key) {
                prop_assert_eq!(next.get(key), Some(value));
            }
        }
    }

    /// Property: an empty patch is the identity.
    #[test]
    fn prop_empty_patch_is_identity(current in document()) {
        prop_assert_eq!(apply_patch(&current, &DocumentPatch::new()), current);
    }

    /// Property: storage keys are stable and 16 hex characters.
    #[test]
    fn prop_storage_key_is_stable_hex(id in "[a-zA-Z0-9/_.-]{1,80}") {
        let a = WorkspaceId::new(id.clone()).unwrap();
        let b = WorkspaceId::new(id).unwrap();
        prop_assert_eq!(a.storage_key(), b.storage_key());
        prop_assert_eq!(a.storage_key().len(), 16);
        prop_assert!(a.storage_key().chars().all(|c| c.is_ascii_hexdigit()));
    }

    /// Property: blank workspace ids are always rejected.
    #[test]
    fn prop_blank_workspace_id_rejected(id in "[ \t\n]{0,10}") {
        prop_assert!(WorkspaceId::new(id).unwrap_err().is_invalid_input());
    }

    /// Property: repeating text never lowers its token estimate.
    #[test]
    fn prop_token_estimate_grows_with_repetition(text in "[a-z ,.]{0,120}", times in 1usize..5) {
        let repeated = vec![text.as_str(); times].join(" ");
        prop_assert!(estimate_tokens(&repeated) >= estimate_tokens(&text));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: each write bumps the version by exactly one and appends
    /// exactly one history entry.
    #[test]
    fn prop_every_write_bumps_version(
        ops in proptest::collection::vec(proptest::collection::btree_map("[a-c]", patch_op(), 0..3), 1..8),
    ) {
        let services = ServiceContainer::new(ContextKeepConfig::in_memory()).unwrap();
        let ws = WorkspaceId::new("prop").unwrap();
        let mut expected = DocumentContent::new();

        for (i, patch) in ops.iter().enumerate() {
            expected = apply_patch(&expected, patch);
            let doc = services
                .context()
                .update(&ws, ContextKind::Active, ContextUpdate::Patch(patch.clone()))
                .unwrap();
            prop_assert_eq!(doc.version, i as u64 + 1);
            prop_assert_eq!(&doc.content, &expected);
        }

        let history = services
            .context()
            .history(&ws, ContextKind::Active, &HistoryQuery::new())
            .unwrap();
        prop_assert_eq!(history.len(), ops.len());
    }

    /// Property: dynamic context stays within any budget and never
    /// includes a partial section.
    #[test]
    fn prop_dynamic_context_within_budget(
        budget in 0usize..400,
        decisions in proptest::collection::vec("[a-z]{1,12}( [a-z]{1,12}){0,15}", 0..6),
    ) {
        let services = ServiceContainer::new(ContextKeepConfig::in_memory()).unwrap();
        let ws = WorkspaceId::new("budget").unwrap();
        for summary in &decisions {
            services
                .graph()
                .log_decision(&ws, NewDecision::new(summary.clone()))
                .unwrap();
        }

        let bundle = services
            .assembler()
            .get_dynamic_context(&ws, "recent design decisions", Some(budget))
            .unwrap();
        prop_assert!(bundle.tokens_used <= budget);
        prop_assert_eq!(bundle.tokens_remaining, budget - bundle.tokens_used);
        for section in &bundle.sections {
            prop_assert_eq!(section.tokens, estimate_tokens(&section.content));
        }
    }
}
