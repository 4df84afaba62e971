//! End-to-end tests for pattern matching and traversal.

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

// ============================================================================
// Single-hop traversal
// ============================================================================

#[test]
fn test_outgoing_traversal_ordered() {
    let (_store, engine) = setup();
    run(
        &engine,
        "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})-[:KNOWS]->(c:P {name: 'C'})",
    );

    let result = run(
        &engine,
        "MATCH (x:P)-[:KNOWS]->(y:P) RETURN x.name, y.name ORDER BY x.name",
    );
    assert_eq!(result.columns, vec!["x.name", "y.name"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("A".into()), Value::String("B".into())],
            vec![Value::String("B".into()), Value::String("C".into())],
        ]
    );
}

#[test]
fn test_incoming_traversal() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");

    let result = run(&engine, "MATCH (x:P)<-[:KNOWS]-(y:P) RETURN x.name, y.name");
    assert_eq!(
        result.rows,
        vec![vec![Value::String("B".into()), Value::String("A".into())]]
    );
}

#[test]
fn test_undirected_yields_one_row_per_direction() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");

    let result = run(
        &engine,
        "MATCH (x:P)-[:KNOWS]-(y:P) RETURN x.name, y.name ORDER BY x.name",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("A".into()), Value::String("B".into())],
            vec![Value::String("B".into()), Value::String("A".into())],
        ]
    );
}

#[test]
fn test_relationship_type_filter() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    run(
        &engine,
        "MATCH (a:P {name: 'A'}), (b:P {name: 'B'}) CREATE (a)-[:WORKS_WITH]->(b)",
    );

    let knows = run(&engine, "MATCH (x:P)-[:KNOWS]->(y:P) RETURN y.name");
    assert_eq!(knows.rows.len(), 1);

    let either = run(&engine, "MATCH (x:P)-[r:KNOWS|WORKS_WITH]->(y:P) RETURN type(r) ORDER BY type(r)");
    assert_eq!(
        either.rows,
        vec![
            vec![Value::String("KNOWS".into())],
            vec![Value::String("WORKS_WITH".into())],
        ]
    );
}

#[test]
fn test_relationship_property_filter() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P)-[:KNOWS {since: 2020}]->(b:P {name: 'B'})");
    run(&engine, "CREATE (c:P)-[:KNOWS {since: 2024}]->(d:P {name: 'D'})");

    let result = run(
        &engine,
        "MATCH (x:P)-[:KNOWS {since: 2024}]->(y:P) RETURN y.name",
    );
    assert_eq!(result.rows, vec![vec![Value::String("D".into())]]);
}

#[test]
fn test_relationship_variable_and_where() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P)-[:KNOWS {w: 1}]->(b:P {name: 'B'})");
    run(&engine, "CREATE (c:P)-[:KNOWS {w: 9}]->(d:P {name: 'D'})");

    let result = run(
        &engine,
        "MATCH (x:P)-[r:KNOWS]->(y:P) WHERE r.w > 5 RETURN y.name",
    );
    assert_eq!(result.rows, vec![vec![Value::String("D".into())]]);
}

// ============================================================================
// Multiple patterns and joins
// ============================================================================

#[test]
fn test_multiple_match_natural_join() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    run(
        &engine,
        "MATCH (b:P {name: 'B'}) CREATE (b)-[:LIKES]->(c:Thing {name: 'T'})",
    );

    // Shared variable m joins the two MATCH clauses.
    let result = run(
        &engine,
        "MATCH (a:P)-[:KNOWS]->(m:P) MATCH (m)-[:LIKES]->(t:Thing) RETURN a.name, t.name",
    );
    assert_eq!(
        result.rows,
        vec![vec![Value::String("A".into()), Value::String("T".into())]]
    );
}

#[test]
fn test_cartesian_product_without_shared_variables() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:X {v: 1})");
    run(&engine, "CREATE (b:X {v: 2})");
    run(&engine, "CREATE (c:Y {v: 3})");

    let result = run(&engine, "MATCH (x:X), (y:Y) RETURN x.v, y.v ORDER BY x.v");
    assert_eq!(result.rows.len(), 2);
}

// ============================================================================
// OPTIONAL MATCH
// ============================================================================

#[test]
fn test_optional_match_injects_nulls() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    run(&engine, "CREATE (c:P {name: 'C'})");

    let result = run(
        &engine,
        "MATCH (p:P) OPTIONAL MATCH (p)-[:KNOWS]->(f:P) \
         RETURN p.name, f.name ORDER BY p.name",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("A".into()), Value::String("B".into())],
            vec![Value::String("B".into()), Value::Null],
            vec![Value::String("C".into()), Value::Null],
        ]
    );
}

#[test]
fn test_optional_match_where_folds_into_pattern() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS {w: 1}]->(b:P {name: 'B'})");

    let result = run(
        &engine,
        "MATCH (p:P {name: 'A'}) OPTIONAL MATCH (p)-[r:KNOWS]->(f:P) WHERE r.w > 5 \
         RETURN p.name, f.name",
    );
    assert_eq!(
        result.rows,
        vec![vec![Value::String("A".into()), Value::Null]]
    );
}

// ============================================================================
// Variable-length paths
// ============================================================================

fn chain(engine: &Arc<dyn QueryEngine>) {
    run(engine, "CREATE (n1:VLP {id: 1})-[:NEXT]->(n2:VLP {id: 2})-[:NEXT]->(n3:VLP {id: 3})-[:NEXT]->(n4:VLP {id: 4})");
}

#[test]
fn test_var_length_range() {
    let (_store, engine) = setup();
    chain(&engine);

    let result = run(
        &engine,
        "MATCH (a:VLP {id: 1})-[:NEXT*1..3]->(b:VLP) RETURN b.id ORDER BY b.id",
    );
    assert_eq!(
        result.rows,
        vec![vec![Value::Int(2)], vec![Value::Int(3)], vec![Value::Int(4)]]
    );
}

#[test]
fn test_var_length_exact_and_min() {
    let (_store, engine) = setup();
    chain(&engine);

    let exact = run(&engine, "MATCH (a:VLP {id: 1})-[:NEXT*2]->(b:VLP) RETURN b.id");
    assert_eq!(exact.rows, vec![vec![Value::Int(3)]]);

    let from_two = run(
        &engine,
        "MATCH (a:VLP {id: 1})-[:NEXT*2..]->(b:VLP) RETURN b.id ORDER BY b.id",
    );
    assert_eq!(from_two.rows, vec![vec![Value::Int(3)], vec![Value::Int(4)]]);
}

#[test]
fn test_var_length_unbounded_star() {
    let (_store, engine) = setup();
    chain(&engine);

    let result = run(
        &engine,
        "MATCH (a:VLP {id: 1})-[:NEXT*]->(b:VLP) RETURN b.id ORDER BY b.id",
    );
    assert_eq!(result.rows.len(), 3);
}

#[test]
fn test_var_length_binds_edge_list() {
    let (_store, engine) = setup();
    chain(&engine);

    let result = run(
        &engine,
        "MATCH (a:VLP {id: 1})-[r:NEXT*2..2]->(b:VLP) RETURN size(r)",
    );
    assert_eq!(result.rows, vec![vec![Value::Int(2)]]);
}

#[test]
fn test_var_length_simple_paths_in_cycle() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:C {id: 1})-[:N]->(b:C {id: 2})");
    run(
        &engine,
        "MATCH (a:C {id: 2}), (b:C {id: 1}) CREATE (a)-[:N]->(b)",
    );

    // Edges cannot repeat, so the cycle terminates: 1->2 and 1->2->1.
    let result = run(
        &engine,
        "MATCH (a:C {id: 1})-[:N*1..5]->(b:C) RETURN b.id ORDER BY b.id",
    );
    assert_eq!(result.rows, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
}

#[test]
fn test_path_variable_and_length() {
    let (_store, engine) = setup();
    chain(&engine);

    let result = run(
        &engine,
        "MATCH p = (a:VLP {id: 1})-[:NEXT*1..3]->(b:VLP) RETURN length(p) ORDER BY length(p)",
    );
    assert_eq!(
        result.rows,
        vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]
    );
}

// ============================================================================
// Shortest paths
// ============================================================================

fn diamond(engine: &Arc<dyn QueryEngine>) {
    // s -> l -> t and s -> r -> t (two shortest paths of length 2),
    // plus a longer detour s -> d1 -> d2 -> t.
    run(engine, "CREATE (s:G {id: 's'})-[:E]->(l:G {id: 'l'})-[:E]->(t:G {id: 't'})");
    run(
        engine,
        "MATCH (s:G {id: 's'}), (t:G {id: 't'}) CREATE (s)-[:E]->(r:G {id: 'r'})-[:E]->(t)",
    );
    run(
        engine,
        "MATCH (s:G {id: 's'}), (t:G {id: 't'}) \
         CREATE (s)-[:E]->(d1:G {id: 'd1'})-[:E]->(d2:G {id: 'd2'})-[:E]->(t)",
    );
}

#[test]
fn test_shortest_path_length() {
    let (_store, engine) = setup();
    diamond(&engine);

    let result = run(
        &engine,
        "MATCH p = shortestPath((s:G {id: 's'})-[:E*..6]->(t:G {id: 't'})) RETURN length(p)",
    );
    assert_eq!(result.rows, vec![vec![Value::Int(2)]]);
}

#[test]
fn test_all_shortest_paths() {
    let (_store, engine) = setup();
    diamond(&engine);

    let result = run(
        &engine,
        "MATCH p = allShortestPaths((s:G {id: 's'})-[:E*..6]->(t:G {id: 't'})) RETURN length(p)",
    );
    assert_eq!(result.rows, vec![vec![Value::Int(2)], vec![Value::Int(2)]]);
}

#[test]
fn test_shortest_path_no_route_yields_no_rows() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:G {id: 'a'})");
    run(&engine, "CREATE (b:G {id: 'b'})");

    let result = run(
        &engine,
        "MATCH p = shortestPath((a:G {id: 'a'})-[:E*..4]->(b:G {id: 'b'})) RETURN length(p)",
    );
    assert_eq!(result.rows.len(), 0);
}

// ============================================================================
// Subquery expressions and degrees
// ============================================================================

#[test]
fn test_exists_subquery() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    run(&engine, "CREATE (c:P {name: 'C'})");

    let result = run(
        &engine,
        "MATCH (p:P) WHERE EXISTS { (p)-[:KNOWS]->(:P) } RETURN p.name",
    );
    assert_eq!(result.rows, vec![vec![Value::String("A".into())]]);
}

#[test]
fn test_count_subquery() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    run(
        &engine,
        "MATCH (a:P {name: 'A'}) CREATE (a)-[:KNOWS]->(c:P {name: 'C'})",
    );

    let result = run(
        &engine,
        "MATCH (p:P {name: 'A'}) RETURN count { (p)-[:KNOWS]->(:P) } AS friends",
    );
    assert_eq!(result.value_at(0, "friends"), Some(&Value::Int(2)));
}

#[test]
fn test_degree_functions() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    run(
        &engine,
        "MATCH (b:P {name: 'B'}) CREATE (b)-[:KNOWS]->(c:P {name: 'C'})",
    );

    let result = run(
        &engine,
        "MATCH (b:P {name: 'B'}) RETURN inDegree(b) AS i, outDegree(b) AS o, degree(b) AS d",
    );
    assert_eq!(result.value_at(0, "i"), Some(&Value::Int(1)));
    assert_eq!(result.value_at(0, "o"), Some(&Value::Int(1)));
    assert_eq!(result.value_at(0, "d"), Some(&Value::Int(2)));
}

#[test]
fn test_nodes_and_relationships_of_path() {
    let (_store, engine) = setup();
    chain(&engine);

    let result = run(
        &engine,
        "MATCH p = (a:VLP {id: 1})-[:NEXT*3..3]->(b:VLP) \
         RETURN size(nodes(p)) AS n, size(relationships(p)) AS r",
    );
    assert_eq!(result.value_at(0, "n"), Some(&Value::Int(4)));
    assert_eq!(result.value_at(0, "r"), Some(&Value::Int(3)));
}
