#![allow(clippy::all)]

use std::collections::BTreeMap;
use std::sync::Arc;

use grafo::{
    param, EdgeKindDef, GraphDef, GraphStore, NodeKindDef, PropType, QueryEngine, SortDirection,
    SqliteBackend, SqliteDialect, Value,
};

fn setup() -> (QueryEngine, GraphStore) {
    let graph = GraphDef::new("social")
        .with_node(
            NodeKindDef::new("Person")
                .prop("name", PropType::string())
                .prop("age", PropType::number())
                .prop("joined", PropType::optional(PropType::date())),
        )
        .with_edge(EdgeKindDef::new("knows", ["Person"], ["Person"]));
    let backend = Arc::new(SqliteBackend::open_in_memory().expect("backend opens"));
    let store = GraphStore::open(Arc::clone(&backend), "social").expect("store opens");
    let engine = QueryEngine::new(graph, Arc::new(SqliteDialect::new()), backend);
    (engine, store)
}

fn person(store: &GraphStore, id: &str, name: &str, age: i64) {
    store
        .insert_node(
            "Person",
            id,
            Value::object([("name", Value::from(name)), ("age", Value::from(age))]),
        )
        .expect("node inserted");
}

fn bindings<const N: usize>(entries: [(&str, Value); N]) -> BTreeMap<String, Value> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

#[test]
fn prepared_query_rebinds_across_calls() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq(param("n")))
        .select(|c| c.get("p", "age"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    assert_eq!(
        prepared
            .execute(&bindings([("n", Value::from("Alice"))]))
            .expect("first call"),
        vec![Value::from(30i64)]
    );
    assert_eq!(
        prepared
            .execute(&bindings([("n", Value::from("Bob"))]))
            .expect("second call"),
        vec![Value::from(25i64)]
    );
}

#[test]
fn unexpected_parameters_are_rejected() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq(param("n")))
        .select(|c| c.get("p", "age"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    let error = prepared
        .execute(&bindings([
            ("n", Value::from("Alice")),
            ("extra", Value::from(1i64)),
        ]))
        .expect_err("must fail");
    assert_eq!(error.code(), "ConfigurationError");
    assert!(error.to_string().contains("extra"));
}

#[test]
fn missing_parameters_are_rejected() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| {
            p.field("name").eq(param("n")).and(p.field("age").gt(param("min")))
        })
        .select(|c| c.get("p", "age"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    let error = prepared
        .execute(&bindings([("n", Value::from("Alice"))]))
        .expect_err("must fail");
    assert_eq!(error.code(), "ConfigurationError");
    assert!(error.to_string().contains("min"));
}

#[test]
fn null_bindings_are_rejected() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq(param("n")))
        .select(|c| c.get("p", "age"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    let error = prepared
        .execute(&bindings([("n", Value::Null)]))
        .expect_err("must fail");
    assert_eq!(error.code(), "ConfigurationError");
}

#[test]
fn string_op_parameters_must_be_strings() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").contains(param("pat")))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    assert_eq!(
        prepared
            .execute(&bindings([("pat", Value::from("li"))]))
            .expect("valid call"),
        vec![Value::from("Alice")]
    );
    let error = prepared
        .execute(&bindings([("pat", Value::from(9i64))]))
        .expect_err("must fail");
    assert_eq!(error.code(), "ConfigurationError");
}

#[test]
fn date_bindings_serialize_as_iso_strings() {
    let (engine, store) = setup();
    store
        .insert_node(
            "Person",
            "p1",
            Value::object([
                ("name", Value::from("Alice")),
                ("age", Value::from(30i64)),
                ("joined", Value::from("2020-06-01T00:00:00Z")),
            ]),
        )
        .expect("node inserted");
    store
        .insert_node(
            "Person",
            "p2",
            Value::object([
                ("name", Value::from("Bob")),
                ("age", Value::from(25i64)),
                ("joined", Value::from("2024-06-01T00:00:00Z")),
            ]),
        )
        .expect("node inserted");

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("joined").lt(param("before")))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    let cutoff = Value::date("2022-01-01T00:00:00Z").expect("valid date");
    assert_eq!(
        prepared
            .execute(&bindings([("before", cutoff)]))
            .expect("query runs"),
        vec![Value::from("Alice")]
    );
}

#[test]
fn between_bounds_accept_parameters() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("age").between(param("lo"), param("hi")))
        .order_by("p", "age", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    assert_eq!(
        prepared
            .execute(&bindings([
                ("lo", Value::from(24i64)),
                ("hi", Value::from(31i64)),
            ]))
            .expect("query runs"),
        vec![Value::from("Bob"), Value::from("Alice")]
    );
}

#[test]
fn prepared_queries_use_the_selective_form() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    // The callback only reads `name`, so the prepared query captures a
    // selective form; results must match regardless.
    let prepared = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("age").gte(param("min")))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .prepare()
        .expect("prepare succeeds");

    assert_eq!(
        prepared
            .execute(&bindings([("min", Value::from(18i64))]))
            .expect("query runs"),
        vec![Value::from("Alice")]
    );
    assert_eq!(
        prepared
            .execute(&bindings([("min", Value::from(50i64))]))
            .expect("query runs"),
        Vec::<Value>::new()
    );
}
