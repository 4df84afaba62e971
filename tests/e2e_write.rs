//! End-to-end tests for updating clauses and their counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cypher_rs::{
    GraphStore,
    BackendKind, CancellationToken, EngineConfig, Error, MemoryStore, PropertyMap, QueryEngine,
    QueryResult, QueryStats, Value, open_engine,
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

fn fail(engine: &Arc<dyn QueryEngine>, query: &str) -> Error {
    engine
        .execute(&CancellationToken::new(), query, PropertyMap::new())
        .expect_err("query should fail")
}

// ============================================================================
// CREATE
// ============================================================================

#[test]
fn test_create_relationship_chain() {
    let (store, engine) = setup();

    let result = run(
        &engine,
        "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})-[:KNOWS]->(c:P {name: 'C'})",
    );
    assert_eq!(result.stats.nodes_created, 3);
    assert_eq!(result.stats.relationships_created, 2);
    assert_eq!(store.node_count().unwrap(), 3);
    assert_eq!(store.edge_count().unwrap(), 2);
}

#[test]
fn test_create_reuses_bound_variables() {
    let (store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})");
    run(&engine, "CREATE (b:P {name: 'B'})");

    let result = run(
        &engine,
        "MATCH (a:P {name: 'A'}), (b:P {name: 'B'}) CREATE (a)-[:KNOWS]->(b)",
    );
    assert_eq!(result.stats.nodes_created, 0);
    assert_eq!(result.stats.relationships_created, 1);
    assert_eq!(store.node_count().unwrap(), 2);
}

#[test]
fn test_create_incoming_direction() {
    let (store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})<-[:KNOWS]-(b:P {name: 'B'})");

    let edges = store.all_edges().unwrap();
    assert_eq!(edges.len(), 1);
    // B knows A: the arrow points at A.
    let src = store.get_node(&edges[0].src).unwrap().unwrap();
    assert_eq!(src.get("name"), Some(&Value::String("B".into())));
}

#[test]
fn test_create_per_input_row() {
    let (store, engine) = setup();
    run(&engine, "UNWIND [1, 2, 3] AS v CREATE (n:Item {v: v})");
    assert_eq!(store.node_count().unwrap(), 3);
}

#[test]
fn test_create_rejects_typeless_relationship() {
    let (_store, engine) = setup();
    let err = fail(&engine, "CREATE (a:P)-[]->(b:P)");
    assert!(matches!(err, Error::SyntaxError { .. }), "got {err:?}");
}

#[test]
fn test_create_rejects_undirected_relationship() {
    let (_store, engine) = setup();
    let err = fail(&engine, "CREATE (a:P)-[:KNOWS]-(b:P)");
    assert!(matches!(err, Error::SyntaxError { .. }), "got {err:?}");
}

#[test]
fn test_create_rejects_nested_map_property() {
    let (_store, engine) = setup();
    let err = fail(&engine, "CREATE (n:P {profile: {nested: 1}})");
    match err {
        Error::InvalidProperty { path } => assert!(path.starts_with("profile")),
        other => panic!("expected InvalidProperty, got {other:?}"),
    }
}

#[test]
fn test_node_created_hook_fires() {
    let (_store, engine) = setup();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    engine.set_node_created_hook(Arc::new(move |_id| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    run(&engine, "CREATE (a:P)-[:KNOWS]->(b:P)");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

// ============================================================================
// SET
// ============================================================================

#[test]
fn test_set_property_and_counter() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:Person {name: 'Ada'})");

    let result = run(&engine, "MATCH (n:Person) SET n.age = 4");
    assert_eq!(result.stats.properties_set, 1);

    let node = &store.nodes_by_label("Person").unwrap()[0];
    assert_eq!(node.get("age"), Some(&Value::Int(4)));
}

#[test]
fn test_set_null_removes_property() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:Person {name: 'Ada', age: 3})");

    run(&engine, "MATCH (n:Person) SET n.age = null");
    let node = &store.nodes_by_label("Person").unwrap()[0];
    assert_eq!(node.get("age"), None);
}

#[test]
fn test_set_merge_and_replace_maps() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:Person {name: 'Ada', age: 3})");

    run(&engine, "MATCH (n:Person) SET n += {age: 4, city: 'Oslo'}");
    let node = &store.nodes_by_label("Person").unwrap()[0];
    assert_eq!(node.get("name"), Some(&Value::String("Ada".into())));
    assert_eq!(node.get("age"), Some(&Value::Int(4)));
    assert_eq!(node.get("city"), Some(&Value::String("Oslo".into())));

    run(&engine, "MATCH (n:Person) SET n = {only: true}");
    let node = &store.nodes_by_label("Person").unwrap()[0];
    assert_eq!(node.get("name"), None);
    assert_eq!(node.get("only"), Some(&Value::Bool(true)));
}

#[test]
fn test_set_label() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:Person {name: 'Ada'})");

    let result = run(&engine, "MATCH (n:Person) SET n:Employee");
    assert_eq!(result.stats.labels_added, 1);
    assert_eq!(store.nodes_by_label("Employee").unwrap().len(), 1);

    // Re-adding is a no-op.
    let again = run(&engine, "MATCH (n:Person) SET n:Employee");
    assert_eq!(again.stats.labels_added, 0);
}

#[test]
fn test_set_visible_to_same_query_return() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:Person {v: 1})");

    let result = run(&engine, "MATCH (n:Person) SET n.v = 2 RETURN n.v");
    assert_eq!(result.rows, vec![vec![Value::Int(2)]]);
}

#[test]
fn test_set_relationship_property() {
    let (store, engine) = setup();
    run(&engine, "CREATE (a:P)-[:KNOWS {since: 2020}]->(b:P)");

    run(&engine, "MATCH (a:P)-[r:KNOWS]->(b:P) SET r.since = 2024");
    let edge = &store.all_edges().unwrap()[0];
    assert_eq!(edge.get("since"), Some(&Value::Int(2024)));
}

// ============================================================================
// REMOVE
// ============================================================================

#[test]
fn test_remove_property_and_label() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:Person:Employee {name: 'Ada', age: 3})");

    let result = run(&engine, "MATCH (n:Person) REMOVE n.age, n:Employee");
    assert_eq!(result.stats.properties_set, 1);
    assert_eq!(result.stats.labels_removed, 1);

    let node = &store.nodes_by_label("Person").unwrap()[0];
    assert_eq!(node.get("age"), None);
    assert!(!node.has_label("Employee"));
}

// ============================================================================
// DELETE / DETACH DELETE
// ============================================================================

#[test]
fn test_delete_connected_node_fails_without_detach() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:Person {name: 'A'})-[:KNOWS]->(b:Person {name: 'B'})");

    let err = fail(&engine, "MATCH (n:Person {name: 'A'}) DELETE n");
    assert!(matches!(err, Error::IntegrityError(_)), "got {err:?}");
}

#[test]
fn test_detach_delete_scenario() {
    let (store, engine) = setup();
    run(&engine, "CREATE (a:Person {name: 'A'})-[:KNOWS]->(b:Person {name: 'B'})");

    let result = run(&engine, "MATCH (n:Person) DETACH DELETE n");
    assert_eq!(result.stats.nodes_deleted, 2);
    assert_eq!(result.stats.relationships_deleted, 1);
    assert_eq!(store.node_count().unwrap(), 0);
    assert_eq!(store.edge_count().unwrap(), 0);
}

#[test]
fn test_delete_counts_each_entity_once() {
    let (store, engine) = setup();
    run(&engine, "CREATE (hub:Hub)");
    run(&engine, "CREATE (a:Leaf)");
    run(&engine, "CREATE (b:Leaf)");
    run(
        &engine,
        "MATCH (h:Hub), (l:Leaf) CREATE (h)-[:OWNS]->(l)",
    );

    // The hub appears once per matched leaf row but is deleted once.
    let result = run(&engine, "MATCH (h:Hub)-[:OWNS]->(l:Leaf) DETACH DELETE h");
    assert_eq!(result.stats.nodes_deleted, 1);
    assert_eq!(result.stats.relationships_deleted, 2);
    assert_eq!(store.node_count().unwrap(), 2);
}

#[test]
fn test_delete_relationship_variable() {
    let (store, engine) = setup();
    run(&engine, "CREATE (a:P)-[:KNOWS]->(b:P)");

    let result = run(&engine, "MATCH (a:P)-[r:KNOWS]->(b:P) DELETE r");
    assert_eq!(result.stats.relationships_deleted, 1);
    assert_eq!(store.edge_count().unwrap(), 0);
    assert_eq!(store.node_count().unwrap(), 2);
}

// ============================================================================
// MERGE
// ============================================================================

#[test]
fn test_merge_is_idempotent() {
    let (store, engine) = setup();

    let first = run(&engine, "MERGE (n:C {name: 'x'}) ON CREATE SET n.created = true");
    assert_eq!(first.stats.nodes_created, 1);
    assert_eq!(first.stats.properties_set, 1);

    let second = run(&engine, "MERGE (n:C {name: 'x'}) ON CREATE SET n.created = true");
    assert_eq!(second.stats, QueryStats::default());

    let nodes = store.nodes_by_label("C").unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].get("created"), Some(&Value::Bool(true)));
}

#[test]
fn test_merge_on_match_fires_for_existing() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:C {name: 'x'})");

    let result = run(
        &engine,
        "MERGE (n:C {name: 'x'}) ON CREATE SET n.created = true ON MATCH SET n.seen = true",
    );
    assert_eq!(result.stats.nodes_created, 0);
    assert_eq!(result.stats.properties_set, 1);

    let node = &store.nodes_by_label("C").unwrap()[0];
    assert_eq!(node.get("seen"), Some(&Value::Bool(true)));
    assert_eq!(node.get("created"), None);
}

#[test]
fn test_merge_relationship_pattern() {
    let (store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})");
    run(&engine, "CREATE (b:P {name: 'B'})");

    // No full pattern match exists, so MERGE creates the entire pattern —
    // fresh endpoints included, not the existing unconnected nodes.
    run(&engine, "MERGE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    assert_eq!(store.edge_count().unwrap(), 1);
    assert_eq!(store.node_count().unwrap(), 4);

    // Now the pattern matches, so a second MERGE is a no-op.
    run(&engine, "MERGE (a:P {name: 'A'})-[:KNOWS]->(b:P {name: 'B'})");
    assert_eq!(store.edge_count().unwrap(), 1);
    assert_eq!(store.node_count().unwrap(), 4);
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn test_transaction_rollback() {
    let (store, engine) = setup();
    run(&engine, "CREATE (n:Keep)");

    run(&engine, "BEGIN");
    run(&engine, "CREATE (n:Temp)");
    assert_eq!(store.node_count().unwrap(), 2);
    run(&engine, "ROLLBACK");
    assert_eq!(store.node_count().unwrap(), 1);
}

#[test]
fn test_transaction_commit() {
    let (store, engine) = setup();
    run(&engine, "BEGIN; CREATE (n:Kept); COMMIT");
    assert_eq!(store.node_count().unwrap(), 1);
}

#[test]
fn test_nested_begin_fails() {
    let (_store, engine) = setup();
    run(&engine, "BEGIN");
    let err = fail(&engine, "BEGIN");
    assert!(matches!(err, Error::TxError(_)));
    run(&engine, "COMMIT");

    let err = fail(&engine, "COMMIT");
    assert!(matches!(err, Error::TxError(_)));
    let err = fail(&engine, "ROLLBACK");
    assert!(matches!(err, Error::TxError(_)));
}

// ============================================================================
// Schema commands
// ============================================================================

#[test]
fn test_create_and_drop_index() {
    let (store, engine) = setup();

    let created = run(&engine, "CREATE INDEX idx_person_name FOR (n:Person) ON (n.name)");
    assert_eq!(created.stats.indexes_created, 1);
    assert_eq!(store.indexes().unwrap().len(), 1);

    let dropped = run(&engine, "DROP INDEX idx_person_name");
    assert_eq!(dropped.stats.indexes_deleted, 1);
    assert!(store.indexes().unwrap().is_empty());

    let err = fail(&engine, "DROP INDEX idx_person_name");
    assert!(matches!(err, Error::StorageError(_)));
}

#[test]
fn test_create_constraint() {
    let (store, engine) = setup();

    let result = run(
        &engine,
        "CREATE CONSTRAINT uniq_name FOR (n:Person) REQUIRE n.name IS UNIQUE",
    );
    assert_eq!(result.stats.constraints_created, 1);

    let constraints = store.constraints().unwrap();
    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints[0].constraint_type, "UNIQUENESS");
    assert_eq!(constraints[0].entity_type, "NODE");
}

// ============================================================================
// Mutation counters vs storage deltas
// ============================================================================

#[test]
fn test_counters_match_storage_deltas() {
    let (store, engine) = setup();

    let before_nodes = store.node_count().unwrap();
    let before_edges = store.edge_count().unwrap();
    let result = run(&engine, "CREATE (a:D)-[:R]->(b:D), (c:D)");
    let after_nodes = store.node_count().unwrap();
    let after_edges = store.edge_count().unwrap();

    assert_eq!(
        after_nodes - before_nodes,
        result.stats.nodes_created - result.stats.nodes_deleted
    );
    assert_eq!(
        after_edges - before_edges,
        result.stats.relationships_created - result.stats.relationships_deleted
    );
}
