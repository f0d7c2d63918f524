#![allow(clippy::all)]

use std::sync::Arc;

use grafo::{
    EdgeKindDef, GraphDef, GraphStore, NodeKindDef, PropType, QueryEngine, SortDirection,
    SqliteBackend, SqliteDialect, Value,
};

fn setup() -> (QueryEngine, GraphStore) {
    let graph = GraphDef::new("social")
        .with_node(
            NodeKindDef::new("Person")
                .prop("name", PropType::string())
                .prop("age", PropType::number()),
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

fn names_where(
    engine: &QueryEngine,
    build: impl FnOnce(grafo::QueryBuilder) -> grafo::QueryBuilder,
) -> grafo::ExecutableQuery {
    build(engine.from("Person", "p"))
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds")
}

fn sorted_names(values: Vec<Value>) -> Vec<String> {
    let mut names: Vec<String> = values
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();
    names.sort();
    names
}

#[test]
fn union_deduplicates_rows() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let young = names_where(&engine, |q| q.where_node("p", |p| p.field("age").lt(35)));
    let elder = names_where(&engine, |q| q.where_node("p", |p| p.field("age").gt(28)));

    let union = young.union(&elder).execute().expect("union runs");
    assert_eq!(sorted_names(union), vec!["Alice", "Bob", "Carol"]);

    let union_all = young.union_all(&elder).execute().expect("union all runs");
    // Alice satisfies both branches, so the multiset keeps her twice.
    assert_eq!(
        sorted_names(union_all),
        vec!["Alice", "Alice", "Bob", "Carol"]
    );
}

#[test]
fn intersect_and_except() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let young = names_where(&engine, |q| q.where_node("p", |p| p.field("age").lt(35)));
    let elder = names_where(&engine, |q| q.where_node("p", |p| p.field("age").gt(28)));

    let both = young.intersect(&elder).execute().expect("intersect runs");
    assert_eq!(sorted_names(both), vec!["Alice"]);

    let only_young = young.except(&elder).execute().expect("except runs");
    assert_eq!(sorted_names(only_young), vec!["Bob"]);
}

#[test]
fn union_is_associative_on_row_sets() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let a = names_where(&engine, |q| q.where_node("p", |p| p.field("age").lt(28)));
    let b = names_where(&engine, |q| {
        q.where_node("p", |p| p.field("age").between(28, 35))
    });
    let c = names_where(&engine, |q| q.where_node("p", |p| p.field("age").gt(35)));

    let left = a.union(&b).union(&c).execute().expect("left tree runs");
    let b2 = names_where(&engine, |q| {
        q.where_node("p", |p| p.field("age").between(28, 35))
    });
    let bc = b2.union(&c);
    // Right-associated tree: a UNION (b UNION c).
    let right = a.union_tree(bc).execute().expect("right tree runs");
    assert_eq!(sorted_names(left), sorted_names(right));
}

#[test]
fn outer_limit_applies_to_the_combined_result() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let young = names_where(&engine, |q| q.where_node("p", |p| p.field("age").lt(35)));
    let elder = names_where(&engine, |q| q.where_node("p", |p| p.field("age").gt(28)));

    let limited = young
        .union(&elder)
        .limit(2)
        .execute()
        .expect("limited union runs");
    assert_eq!(limited.len(), 2);
}

#[test]
fn parameterized_queries_cannot_be_composed() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let fixed = names_where(&engine, |q| q.where_node("p", |p| p.field("age").lt(35)));
    let parameterized = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq(grafo::param("n")))
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds");

    let error = fixed
        .union(&parameterized)
        .execute()
        .expect_err("must fail");
    assert_eq!(error.code(), "ValidationError");
}
