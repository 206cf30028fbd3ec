//! Benchmarks for search and context assembly.
//!
//! Benchmark targets:
//! - Hybrid search over 1,000 items: <50ms
//! - Stable prefix assembly with 200 custom data entries: <20ms
//!
//! Both run against disk-backed workspaces so `SQLite` I/O is included.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::print_stderr)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;
use tempfile::TempDir;

use contextkeep::models::{NewCustomDatum, NewDecision, NewSystemPattern};
use contextkeep::{
    ContextKeepConfig, ContextKind, ContextUpdate, SearchFilter, SearchMode, ServiceContainer,
    WorkspaceId,
};

/// Sample technical content for populating the workspace.
const SAMPLE_CONTENT: &[&str] = &[
    "PostgreSQL database configuration with connection pooling",
    "Redis caching layer implementation with TTL",
    "JWT authentication token validation flow",
    "Microservices architecture with event sourcing",
    "Kubernetes deployment configuration with autoscaling",
    "GraphQL API design patterns and best practices",
    "Docker container orchestration strategies",
    "Performance optimization for query planning",
];

fn services(temp_dir: &TempDir) -> ServiceContainer {
    ServiceContainer::new(ContextKeepConfig::default().with_data_dir(temp_dir.path()))
        .expect("Failed to create services")
}

fn populate_decisions(services: &ServiceContainer, ws: &WorkspaceId, count: usize) {
    for i in 0..count {
        let summary = format!("{} - instance {i}", SAMPLE_CONTENT[i % SAMPLE_CONTENT.len()]);
        if let Err(e) = services
            .graph()
            .log_decision(ws, NewDecision::new(summary).with_tags(["benchmark"]))
        {
            eprintln!("Warning: Failed to log decision {i}: {e}");
        }
    }
}

fn populate_prefix_sources(services: &ServiceContainer, ws: &WorkspaceId, data: usize) {
    services
        .context()
        .update(
            ws,
            ContextKind::Product,
            ContextUpdate::replace(json!({
                "goal": "Shared project memory",
                "features": ["search", "prefix caching", "history"],
            }))
            .expect("object content"),
        )
        .expect("Failed to write product context");
    for name in ["Repository", "Outbox", "Cache Aside", "CQRS"] {
        services
            .graph()
            .log_system_pattern(ws, NewSystemPattern::new(name).with_description(SAMPLE_CONTENT[0]))
            .expect("Failed to log pattern");
    }
    for i in 0..data {
        let datum = NewCustomDatum::new("Specifications", format!("spec_{i}"), json!(SAMPLE_CONTENT[i % SAMPLE_CONTENT.len()]))
            .with_cache_hint(i % 2 == 0);
        services
            .graph()
            .log_custom_data(ws, datum)
            .expect("Failed to log custom data");
    }
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.measurement_time(Duration::from_secs(10));

    for count in [100, 1000] {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let services = services(&temp_dir);
        let ws = WorkspaceId::new("bench").expect("workspace id");
        populate_decisions(&services, &ws, count);
        let filter = SearchFilter::new();

        for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
            group.bench_with_input(BenchmarkId::new(mode.to_string(), count), &count, |b, _| {
                b.iter(|| {
                    services
                        .search()
                        .search(&ws, black_box("database configuration"), mode, &filter)
                        .expect("Search should succeed")
                });
            });
        }
    }

    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let services = services(&temp_dir);
    let ws = WorkspaceId::new("bench").expect("workspace id");
    populate_prefix_sources(&services, &ws, 200);
    populate_decisions(&services, &ws, 50);

    let mut group = c.benchmark_group("assembly");
    group.bench_function("build_stable_prefix", |b| {
        b.iter(|| {
            services
                .assembler()
                .build_stable_prefix(&ws)
                .expect("Prefix should build")
        });
    });
    group.bench_function("get_dynamic_context", |b| {
        b.iter(|| {
            services
                .assembler()
                .get_dynamic_context(&ws, black_box("recent architecture decisions"), None)
                .expect("Dynamic context should build")
        });
    });
    group.finish();
}

criterion_group!(benches, bench_search, bench_assembly);
criterion_main!(benches);
