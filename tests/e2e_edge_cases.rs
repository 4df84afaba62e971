//! Edge-case behavior: null semantics, conversions, errors, cancellation.

use std::sync::Arc;
use std::time::Duration;

use cypher_rs::{
    GraphStore,
    BackendKind, CancellationToken, EngineConfig, Error, MemoryStore, PropertyMap, QueryEngine,
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

fn fail(engine: &Arc<dyn QueryEngine>, query: &str) -> Error {
    engine
        .execute(&CancellationToken::new(), query, PropertyMap::new())
        .expect_err("query should fail")
}

// ============================================================================
// Null arithmetic and comparisons
// ============================================================================

#[test]
fn test_division_by_zero_is_null() {
    let (_store, engine) = setup();
    let result = run(&engine, "RETURN 1 / 0 AS a, 1.0 / 0.0 AS b, 5 % 0 AS c");
    assert_eq!(result.value_at(0, "a"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "b"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "c"), Some(&Value::Null));
}

#[test]
fn test_null_propagates_through_operators() {
    let (_store, engine) = setup();
    let result = run(
        &engine,
        "RETURN 1 + null AS a, null = null AS b, null <> 1 AS c, 'x' + null AS d",
    );
    assert_eq!(result.value_at(0, "a"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "b"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "c"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "d"), Some(&Value::Null));
}

#[test]
fn test_kleene_logic() {
    let (_store, engine) = setup();
    let result = run(
        &engine,
        "RETURN (false AND null) AS a, (true OR null) AS b, (true AND null) AS c, (null XOR true) AS d",
    );
    assert_eq!(result.value_at(0, "a"), Some(&Value::Bool(false)));
    assert_eq!(result.value_at(0, "b"), Some(&Value::Bool(true)));
    assert_eq!(result.value_at(0, "c"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "d"), Some(&Value::Null));
}

#[test]
fn test_in_null_semantics() {
    let (_store, engine) = setup();
    let result = run(
        &engine,
        "RETURN (null IN []) AS a, (null IN [1]) AS b, (1 IN [1, null]) AS c, (2 IN [1, null]) AS d",
    );
    assert_eq!(result.value_at(0, "a"), Some(&Value::Bool(false)));
    assert_eq!(result.value_at(0, "b"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "c"), Some(&Value::Bool(true)));
    assert_eq!(result.value_at(0, "d"), Some(&Value::Null));
}

#[test]
fn test_is_null_checks() {
    let (_store, engine) = setup();
    let result = run(&engine, "RETURN (null IS NULL) AS a, (1 IS NOT NULL) AS b");
    assert_eq!(result.value_at(0, "a"), Some(&Value::Bool(true)));
    assert_eq!(result.value_at(0, "b"), Some(&Value::Bool(true)));
}

// ============================================================================
// Regex
// ============================================================================

#[test]
fn test_regex_match() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:Person {name: 'Alice'})");
    run(&engine, "CREATE (n:Person {name: 'Bob'})");

    let result = run(
        &engine,
        "MATCH (n:Person) WHERE n.name =~ 'A.*' RETURN n.name",
    );
    assert_eq!(result.rows, vec![vec![Value::String("Alice".into())]]);
}

#[test]
fn test_regex_requires_whole_string_match() {
    let (_store, engine) = setup();
    let result = run(&engine, "RETURN ('Alice' =~ 'lic') AS partial, ('Alice' =~ '.*lic.*') AS full");
    assert_eq!(result.value_at(0, "partial"), Some(&Value::Bool(false)));
    assert_eq!(result.value_at(0, "full"), Some(&Value::Bool(true)));
}

#[test]
fn test_invalid_regex_is_null_not_error() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:Person {name: 'Alice'})");

    // The broken pattern evaluates to null, so the filter drops the row.
    let result = run(&engine, "MATCH (n:Person) WHERE n.name =~ '(' RETURN n.name");
    assert_eq!(result.rows.len(), 0);
}

// ============================================================================
// Conversion and scalar functions
// ============================================================================

#[test]
fn test_conversions() {
    let (_store, engine) = setup();
    let result = run(
        &engine,
        "RETURN toInteger('42') AS i, toInteger('nope') AS bad, toFloat('2.5') AS f, \
         toBoolean('true') AS t, toString(7) AS s",
    );
    assert_eq!(result.value_at(0, "i"), Some(&Value::Int(42)));
    assert_eq!(result.value_at(0, "bad"), Some(&Value::Null));
    assert_eq!(result.value_at(0, "f"), Some(&Value::Float(2.5)));
    assert_eq!(result.value_at(0, "t"), Some(&Value::Bool(true)));
    assert_eq!(result.value_at(0, "s"), Some(&Value::String("7".into())));
}

#[test]
fn test_string_functions() {
    let (_store, engine) = setup();
    let result = run(
        &engine,
        "RETURN trim('  hi  ') AS t, toLower('ABC') AS l, toUpper('abc') AS u, size('héllo') AS n",
    );
    assert_eq!(result.value_at(0, "t"), Some(&Value::String("hi".into())));
    assert_eq!(result.value_at(0, "l"), Some(&Value::String("abc".into())));
    assert_eq!(result.value_at(0, "u"), Some(&Value::String("ABC".into())));
    assert_eq!(result.value_at(0, "n"), Some(&Value::Int(5)));
}

#[test]
fn test_list_functions() {
    let (_store, engine) = setup();
    let result = run(
        &engine,
        "RETURN head([1, 2, 3]) AS h, last([1, 2, 3]) AS l, tail([1, 2, 3]) AS t, \
         range(1, 4) AS r, size([1, 2]) AS s",
    );
    assert_eq!(result.value_at(0, "h"), Some(&Value::Int(1)));
    assert_eq!(result.value_at(0, "l"), Some(&Value::Int(3)));
    assert_eq!(
        result.value_at(0, "t"),
        Some(&Value::List(vec![Value::Int(2), Value::Int(3)]))
    );
    assert_eq!(
        result.value_at(0, "r"),
        Some(&Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4)
        ]))
    );
    assert_eq!(result.value_at(0, "s"), Some(&Value::Int(2)));
}

#[test]
fn test_entity_functions() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (a:P {name: 'A'})-[:KNOWS]->(b:Q {name: 'B'})");

    let result = run(
        &engine,
        "MATCH (a:P)-[r:KNOWS]->(b:Q) \
         RETURN labels(a) AS la, type(r) AS t, keys(b) AS kb, properties(b) AS pb, \
         exists(a.name) AS has_name, exists(a.missing) AS has_missing",
    );
    assert_eq!(
        result.value_at(0, "la"),
        Some(&Value::List(vec![Value::String("P".into())]))
    );
    assert_eq!(result.value_at(0, "t"), Some(&Value::String("KNOWS".into())));
    assert_eq!(
        result.value_at(0, "kb"),
        Some(&Value::List(vec![Value::String("name".into())]))
    );
    match result.value_at(0, "pb") {
        Some(Value::Map(m)) => assert_eq!(m.get("name"), Some(&Value::String("B".into()))),
        other => panic!("expected map, got {other:?}"),
    }
    assert_eq!(result.value_at(0, "has_name"), Some(&Value::Bool(true)));
    assert_eq!(result.value_at(0, "has_missing"), Some(&Value::Bool(false)));
}

#[test]
fn test_id_is_opaque_string() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:P)");

    let result = run(&engine, "MATCH (n:P) RETURN id(n) AS id");
    match result.value_at(0, "id") {
        Some(Value::String(id)) => assert!(!id.is_empty()),
        other => panic!("expected string id, got {other:?}"),
    }
}

#[test]
fn test_coalesce_and_abs() {
    let (_store, engine) = setup();
    let result = run(&engine, "RETURN coalesce(null, null, 3) AS c, abs(-7) AS a");
    assert_eq!(result.value_at(0, "c"), Some(&Value::Int(3)));
    assert_eq!(result.value_at(0, "a"), Some(&Value::Int(7)));
}

#[test]
fn test_timestamp_is_recent() {
    let (_store, engine) = setup();
    let result = run(&engine, "RETURN timestamp() AS ts");
    match result.value_at(0, "ts") {
        // Sanity bound: after 2020-01-01 in epoch millis.
        Some(Value::Int(ts)) => assert!(*ts > 1_577_836_800_000),
        other => panic!("expected int timestamp, got {other:?}"),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_parse_error_carries_line_and_column() {
    let (_store, engine) = setup();
    let err = fail(&engine, "MATCH (n)\nWHERE RETURN n");
    match err {
        Error::ParseError { line, column, .. } => {
            assert_eq!(line, 2);
            assert!(column > 1);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_lexer_error_carries_position() {
    let (_store, engine) = setup();
    let err = fail(&engine, "MATCH (n) RETURN @");
    assert!(matches!(err, Error::SyntaxError { .. }), "got {err:?}");
}

#[test]
fn test_unknown_procedure() {
    let (_store, engine) = setup();
    let err = fail(&engine, "CALL db.bogus()");
    match err {
        Error::UnknownProcedure(name) => assert_eq!(name, "db.bogus"),
        other => panic!("expected unknown procedure, got {other:?}"),
    }
}

#[test]
fn test_unbound_variable_errors() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:P)");
    let err = fail(&engine, "MATCH (n:P) RETURN ghost");
    assert!(matches!(err, Error::TypeError { .. }), "got {err:?}");
}

#[test]
fn test_unknown_function_errors() {
    let (_store, engine) = setup();
    let err = fail(&engine, "RETURN frobnicate(1) AS x");
    assert!(matches!(err, Error::TypeError { .. }), "got {err:?}");
}

#[test]
fn test_aggregate_in_where_errors() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:P)");
    let err = fail(&engine, "MATCH (n:P) WHERE count(n) > 0 RETURN n");
    assert!(matches!(err, Error::TypeError { .. }), "got {err:?}");
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancelled_token_aborts() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:P)");

    let token = CancellationToken::new();
    token.cancel();
    let err = engine
        .execute(&token, "MATCH (n:P) RETURN n", PropertyMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
}

#[test]
fn test_expired_deadline_aborts() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:P)");

    let token = CancellationToken::with_timeout(Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(2));
    let err = engine
        .execute(&token, "MATCH (n:P) RETURN n", PropertyMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
}

#[test]
fn test_mutations_before_cancel_persist() {
    let (store, engine) = setup();

    // The first statement commits; cancellation mid-script leaves it intact.
    let token = CancellationToken::new();
    run(&engine, "CREATE (n:Durable)");
    token.cancel();
    let err = engine
        .execute(&token, "CREATE (n:Never)", PropertyMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(store.node_count().unwrap(), 1);
}

// ============================================================================
// Ordering across mixed types
// ============================================================================

#[test]
fn test_mixed_type_ordering() {
    let (_store, engine) = setup();
    run(&engine, "CREATE (n:V {x: 2})");
    run(&engine, "CREATE (n:V {x: '10'})");
    run(&engine, "CREATE (n:V {x: 30})");

    // Numerics order numerically among themselves; comparisons against the
    // string fall back to canonical text ("10" < "2" < "30").
    let result = run(&engine, "MATCH (n:V) RETURN n.x ORDER BY n.x");
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("10".into())],
            vec![Value::Int(2)],
            vec![Value::Int(30)],
        ]
    );
}
