//! End-to-end tests for the hybrid orchestrator: fast-path execution,
//! background CST memoization, and the opt-in result cache.
//!
//! The CST cache is process-wide, so every test here uses query text that
//! no other test in this binary uses.

use std::sync::Arc;
use std::time::Duration;

use cypher_rs::engine::{EngineConfig, HybridEngine, QueryEngine, is_read_only};
use cypher_rs::{BackendKind, CancellationToken, Error, GraphStore, MemoryStore, PropertyMap, Value};
use pretty_assertions::assert_eq;

fn hybrid(result_cache: bool) -> (Arc<MemoryStore>, HybridEngine) {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        backend: BackendKind::Hybrid,
        result_cache,
        ..EngineConfig::default()
    };
    let engine = HybridEngine::new(store.clone(), &config);
    (store, engine)
}

fn run(engine: &HybridEngine, query: &str) -> cypher_rs::QueryResult {
    engine
        .execute(&CancellationToken::new(), query, PropertyMap::new())
        .unwrap_or_else(|e| panic!("query failed: {query}: {e}"))
}

// ============================================================================
// Fast-path execution
// ============================================================================

#[test]
fn test_hybrid_create_and_match() {
    let (store, engine) = hybrid(false);

    let created = run(&engine, "CREATE (hq1:Person {name: 'Hybrid'})");
    assert_eq!(created.stats.nodes_created, 1);
    assert_eq!(store.node_count().unwrap(), 1);

    let result = run(&engine, "MATCH (hq1:Person) RETURN hq1.name");
    assert_eq!(result.rows, vec![vec![Value::String("Hybrid".into())]]);
    engine.close();
}

#[test]
fn test_hybrid_rejects_uncovered_shapes() {
    let (_store, engine) = hybrid(false);
    let err = engine
        .execute(
            &CancellationToken::new(),
            "MERGE (hq2:Person {name: 'x'})",
            PropertyMap::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedQuery(_)), "got {err:?}");
    engine.close();
}

#[test]
fn test_hybrid_counts_executions() {
    let (_store, engine) = hybrid(false);
    run(&engine, "CREATE (hq3:Person {name: 'A'})");
    run(&engine, "MATCH (hq3:Person) RETURN hq3.name");
    assert_eq!(engine.stats().executions, 2);
    engine.close();
}

// ============================================================================
// Background CST memoization
// ============================================================================

#[test]
fn test_background_cst_build() {
    let (_store, engine) = hybrid(false);
    let query = "MATCH (hq4_unique:Person) RETURN hq4_unique.name";

    assert!(engine.cst_if_cached(query).is_none());
    run(&engine, query);
    assert_eq!(engine.stats().builds_queued, 1);

    // The worker parses it in the background.
    let cst = engine.wait_for_cst(query, Duration::from_secs(5));
    assert!(cst.is_some(), "background build did not complete");
    assert!(engine.cst_if_cached(query).is_some());
    assert_eq!(engine.stats().builds_completed, 1);

    // A repeat execution sees the cache hit and queues nothing.
    run(&engine, query);
    assert_eq!(engine.stats().builds_queued, 1);
    assert_eq!(engine.stats().cst_cache_hits, 1);
    engine.close();
}

#[test]
fn test_synchronous_cst_on_demand() {
    let (_store, engine) = hybrid(false);
    let query = "MATCH (hq5_unique:Person) RETURN hq5_unique.name";

    // Never executed, so nothing is cached; cst() builds synchronously.
    assert!(engine.cst_if_cached(query).is_none());
    let cst = engine.cst(query).unwrap();
    assert_eq!(cst.queries.len(), 1);
    assert!(engine.cst_if_cached(query).is_some());
    engine.close();
}

#[test]
fn test_wait_for_cst_times_out() {
    let (_store, engine) = hybrid(false);
    let never = "MATCH (hq6_never:Nope) RETURN hq6_never";
    assert!(engine.wait_for_cst(never, Duration::from_millis(10)).is_none());
    engine.close();
}

#[test]
fn test_background_parse_failure_is_swallowed() {
    let (_store, engine) = hybrid(false);
    // `end` is a keyword to the full parser but a plain identifier to the
    // regex path, so the fast path answers while the background build
    // fails; that failure never reaches a caller.
    let query = "MATCH (end:Hq7) RETURN end.name";
    let result = run(&engine, query);
    assert_eq!(result.rows.len(), 0);
    assert_eq!(engine.stats().builds_queued, 1);

    assert!(engine.wait_for_cst(query, Duration::from_millis(200)).is_none());
    assert_eq!(engine.stats().builds_completed, 0);

    // The workers survive and the engine keeps serving queries.
    run(&engine, "CREATE (hq7b:Person {name: 'still alive'})");
    engine.close();
}

// ============================================================================
// Result cache
// ============================================================================

#[test]
fn test_result_cache_hit_equals_uncached() {
    let (_store, engine) = hybrid(true);
    run(&engine, "CREATE (hq8:Item {v: 1})");
    run(&engine, "CREATE (hq8b:Item {v: 2})");

    let query = "MATCH (hq8x:Item) RETURN hq8x.v ORDER BY hq8x.v";
    let first = run(&engine, query);
    assert_eq!(engine.stats().result_cache_hits, 0);

    let second = run(&engine, query);
    assert_eq!(engine.stats().result_cache_hits, 1);
    assert_eq!(first.columns, second.columns);
    assert_eq!(first.rows, second.rows);
    engine.close();
}

#[test]
fn test_mutation_invalidates_result_cache() {
    let (_store, engine) = hybrid(true);
    run(&engine, "CREATE (hq9:Item {v: 1})");

    let query = "MATCH (hq9x:Item) RETURN hq9x.v ORDER BY hq9x.v";
    run(&engine, query);
    assert_eq!(engine.result_cache_len(), 1);

    run(&engine, "CREATE (hq9y:Item {v: 2})");
    assert_eq!(engine.result_cache_len(), 0);

    // The refreshed result reflects the mutation.
    let result = run(&engine, query);
    assert_eq!(result.rows.len(), 2);
    engine.close();
}

#[test]
fn test_result_cache_disabled_by_default() {
    let (_store, engine) = hybrid(false);
    run(&engine, "CREATE (hq10:Item {v: 1})");

    let query = "MATCH (hq10x:Item) RETURN hq10x.v";
    run(&engine, query);
    run(&engine, query);
    assert_eq!(engine.stats().result_cache_hits, 0);
    assert_eq!(engine.result_cache_len(), 0);
    engine.close();
}

#[test]
fn test_clear_caches() {
    let (_store, engine) = hybrid(true);
    run(&engine, "CREATE (hq11:Item {v: 1})");
    let query = "MATCH (hq11x:Item) RETURN hq11x.v";
    run(&engine, query);
    assert_eq!(engine.result_cache_len(), 1);

    engine.clear_caches();
    assert_eq!(engine.result_cache_len(), 0);
    assert!(engine.cst_if_cached(query).is_none());
    engine.close();
}

// ============================================================================
// Read-only classification
// ============================================================================

#[test]
fn test_classification_examples() {
    assert!(is_read_only("MATCH (n) RETURN n"));
    assert!(is_read_only("MATCH (n:Settler) RETURN n.created_at"));
    assert!(!is_read_only("CREATE (n)"));
    assert!(!is_read_only("match (n) set n.x = 1"));
    assert!(!is_read_only("MATCH (n) DETACH DELETE n"));
    assert!(!is_read_only("MERGE (n:X)"));
    assert!(!is_read_only("MATCH (n) REMOVE n.x"));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A mutating keyword embedded inside an identifier never flips the
        /// classification; the same keyword as its own word always does.
        #[test]
        fn classification_respects_word_boundaries(
            prefix in "[a-z]{1,6}",
            keyword in prop::sample::select(vec!["CREATE", "DELETE", "SET", "REMOVE", "MERGE", "DETACH"]),
        ) {
            // Embedded: xCREATEy is one identifier.
            let embedded = format!("MATCH (n:{prefix}{keyword}{prefix}) RETURN n");
            prop_assert!(is_read_only(&embedded));

            // Standalone word.
            let standalone = format!("MATCH (n) {keyword} n");
            prop_assert!(!is_read_only(&standalone));
        }
    }
}
