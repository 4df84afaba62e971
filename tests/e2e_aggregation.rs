//! End-to-end tests for aggregation and grouping.

use std::sync::Arc;

use cypher_rs::{
    BackendKind, CancellationToken, EngineConfig, MemoryStore, PropertyMap, QueryEngine,
    QueryResult, Value, open_engine,
};
use pretty_assertions::assert_eq;

fn setup() -> (Arc<MemoryStore>, Arc<dyn QueryEngine>) {
    let store = Arc::new(MemoryStore::new());
    let engine = open_engine(
        store.clone(),
        EngineConfig { backend: BackendKind::Tree, ..EngineConfig::default() },
    )
    .expect("tree engine");
    (store, engine)
}

fn run(engine: &Arc<dyn QueryEngine>, query: &str) -> QueryResult {
    engine
        .execute(&CancellationToken::new(), query, PropertyMap::new())
        .unwrap_or_else(|e| panic!("query failed: {query}: {e}"))
}

fn sales(engine: &Arc<dyn QueryEngine>) {
    run(engine, "CREATE (s:Sale {product: 'A', amount: 100})");
    run(engine, "CREATE (s:Sale {product: 'A', amount: 200})");
    run(engine, "CREATE (s:Sale {product: 'B', amount: 150})");
    run(engine, "CREATE (s:Sale {product: 'B', amount: 250})");
}

// ============================================================================
// Grouped aggregation
// ============================================================================

#[test]
fn test_sum_grouped_by_product() {
    let (_store, engine) = setup();
    sales(&engine);

    let result = run(
        &engine,
        "MATCH (n:Sale) RETURN n.product AS p, sum(n.amount) AS t ORDER BY p",
    );
    assert_eq!(result.columns, vec!["p", "t"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("A".into()), Value::Int(300)],
            vec![Value::String("B".into()), Value::Int(400)],
        ]
    );
}

#[test]
fn test_count_star_and_grouping() {
    let (_store, engine) = setup();
    sales(&engine);

    let result = run(
        &engine,
        "MATCH (n:Sale) RETURN n.product AS p, count(*) AS c ORDER BY p",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("A".into()), Value::Int(2)],
            vec![Value::String("B".into()), Value::Int(2)],
        ]
    );
}

#[test]
fn test_count_star_counts_nulls_count_expr_does_not() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V {x: 1})");
    run(&engine, "CREATE (n:V {x: 2})");
    run(&engine, "CREATE (n:V)");

    let result = run(&engine, "MATCH (n:V) RETURN count(*) AS all, count(n.x) AS some");
    assert_eq!(result.value_at(0, "all"), Some(&Value::Int(3)));
    assert_eq!(result.value_at(0, "some"), Some(&Value::Int(2)));
}

#[test]
fn test_avg_equals_sum_over_count() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V {x: 10})");
    run(&engine, "CREATE (n:V {x: 20})");
    run(&engine, "CREATE (n:V)");

    let result = run(
        &engine,
        "MATCH (n:V) RETURN sum(n.x) AS s, count(n.x) AS c, avg(n.x) AS a",
    );
    assert_eq!(result.value_at(0, "s"), Some(&Value::Int(30)));
    assert_eq!(result.value_at(0, "c"), Some(&Value::Int(2)));
    assert_eq!(result.value_at(0, "a"), Some(&Value::Float(15.0)));
}

#[test]
fn test_avg_of_all_nulls_is_null() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V)");
    run(&engine, "CREATE (n:V)");

    let result = run(&engine, "MATCH (n:V) RETURN avg(n.x) AS a");
    assert_eq!(result.value_at(0, "a"), Some(&Value::Null));
}

#[test]
fn test_count_over_empty_match_is_zero() {
    let (_store, engine) = setup();

    let result = run(&engine, "MATCH (n:Nothing) RETURN count(*) AS c");
    assert_eq!(result.rows, vec![vec![Value::Int(0)]]);
}

#[test]
fn test_min_max() {
    let (_store, engine) = setup();
    sales(&engine);

    let result = run(
        &engine,
        "MATCH (n:Sale) RETURN min(n.amount) AS lo, max(n.amount) AS hi",
    );
    assert_eq!(result.value_at(0, "lo"), Some(&Value::Int(100)));
    assert_eq!(result.value_at(0, "hi"), Some(&Value::Int(250)));
}

#[test]
fn test_collect_preserves_order_and_skips_nulls() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V {x: 1})");
    run(&engine, "CREATE (n:V)");
    run(&engine, "CREATE (n:V {x: 3})");

    let result = run(&engine, "MATCH (n:V) RETURN collect(n.x) AS xs");
    assert_eq!(
        result.value_at(0, "xs"),
        Some(&Value::List(vec![Value::Int(1), Value::Int(3)]))
    );
}

#[test]
fn test_distinct_inside_aggregate() {
    let (_store, engine) = setup();
    sales(&engine);

    let result = run(
        &engine,
        "MATCH (n:Sale) RETURN count(DISTINCT n.product) AS products",
    );
    assert_eq!(result.value_at(0, "products"), Some(&Value::Int(2)));
}

#[test]
fn test_aggregate_arithmetic() {
    let (_store, engine) = setup();
    sales(&engine);

    let result = run(
        &engine,
        "MATCH (n:Sale) RETURN sum(n.amount) / count(n.amount) AS mean",
    );
    assert_eq!(result.value_at(0, "mean"), Some(&Value::Int(175)));
}

// ============================================================================
// Aggregation through WITH (HAVING)
// ============================================================================

#[test]
fn test_with_aggregation_having() {
    let (_store, engine) = setup();
    sales(&engine);
    run(&engine, "CREATE (s:Sale {product: 'C', amount: 10})");

    let result = run(
        &engine,
        "MATCH (n:Sale) WITH n.product AS p, sum(n.amount) AS total \
         WHERE total > 100 RETURN p ORDER BY p",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("A".into())],
            vec![Value::String("B".into())],
        ]
    );
}

#[test]
fn test_with_aggregate_then_match_again() {
    let (_store, engine) = setup();
    sales(&engine);

    let result = run(
        &engine,
        "MATCH (n:Sale) WITH count(*) AS sales MATCH (m:Sale {product: 'A'}) \
         RETURN sales, count(m) AS a_sales",
    );
    assert_eq!(result.value_at(0, "sales"), Some(&Value::Int(4)));
    assert_eq!(result.value_at(0, "a_sales"), Some(&Value::Int(2)));
}

// ============================================================================
// Representatives and mixed projections
// ============================================================================

#[test]
fn test_group_representative_value() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V {k: 'g', x: 1})");
    run(&engine, "CREATE (n:V {k: 'g', x: 2})");

    // The non-aggregating item keeps one representative per group.
    let result = run(&engine, "MATCH (n:V) RETURN n.k AS k, count(*) AS c");
    assert_eq!(result.rows, vec![vec![Value::String("g".into()), Value::Int(2)]]);
}

#[test]
fn test_grouping_key_canonical_equality() {
    let (_store, engine) = setup();
    // 1 and 1.0 canonicalize differently ("1" vs "1.0"), so two groups.
    run(&engine, "CREATE (n:V {k: 1})");
    run(&engine, "CREATE (n:V {k: 1.5})");
    run(&engine, "CREATE (n:V {k: 1})");

    let result = run(&engine, "MATCH (n:V) RETURN n.k AS k, count(*) AS c ORDER BY c DESC");
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0][1], Value::Int(2));
}

#[test]
fn test_sum_mixes_int_and_float() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V {x: 1})");
    run(&engine, "CREATE (n:V {x: 2.5})");

    let result = run(&engine, "MATCH (n:V) RETURN sum(n.x) AS s");
    assert_eq!(result.value_at(0, "s"), Some(&Value::Float(3.5)));
}
