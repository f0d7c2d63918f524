#![allow(clippy::all)]

use std::sync::Arc;

use grafo::{
    EdgeKindDef, GraphDef, GraphStore, NodeKindDef, PropType, QueryEngine, Recursion,
    SortDirection, SqliteBackend, SqliteDialect, Value,
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

fn person(store: &GraphStore, id: &str, name: &str) {
    store
        .insert_node(
            "Person",
            id,
            Value::object([("name", Value::from(name)), ("age", Value::from(1i64))]),
        )
        .expect("node inserted");
}

fn knows(store: &GraphStore, id: &str, from: &str, to: &str) {
    store
        .insert_edge("knows", id, from, to, Value::Object(Default::default()))
        .expect("edge inserted");
}

/// Chain p1 -> p2 -> p3 -> p4.
fn seed_chain(store: &GraphStore) {
    person(store, "p1", "Alice");
    person(store, "p2", "Bob");
    person(store, "p3", "Carol");
    person(store, "p4", "Dave");
    knows(store, "e1", "p1", "p2");
    knows(store, "e2", "p2", "p3");
    knows(store, "e3", "p3", "p4");
}

#[test]
fn bounded_depth_excludes_distant_nodes() {
    let (engine, store) = setup();
    seed_chain(&store);

    let mut rows = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq("Alice"))
        .traverse("knows", "e")
        .recursive(Recursion::new().max_hops(2).with_depth())
        .to("Person", "r")
        .select(|c| {
            Value::object([
                ("reached", c.get("r", "name")),
                ("hops", c.column("r_depth")),
            ])
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    rows.sort_by_key(|row| row.get("hops").as_i64());
    assert_eq!(
        rows,
        vec![
            Value::object([("reached", Value::from("Bob")), ("hops", Value::from(1i64))]),
            Value::object([
                ("reached", Value::from("Carol")),
                ("hops", Value::from(2i64)),
            ]),
        ]
    );
}

#[test]
fn min_hops_skips_near_nodes() {
    let (engine, store) = setup();
    seed_chain(&store);

    let rows = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq("Alice"))
        .traverse("knows", "e")
        .recursive(Recursion::new().min_hops(2).max_hops(3))
        .to("Person", "r")
        .order_by("r", "name", SortDirection::Asc)
        .select(|c| c.get("r", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows, vec![Value::from("Carol"), Value::from("Dave")]);
}

#[test]
fn path_column_lists_visited_ids() {
    let (engine, store) = setup();
    seed_chain(&store);

    let mut rows = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq("Alice"))
        .traverse("knows", "e")
        .recursive(Recursion::new().max_hops(2).with_path().with_depth())
        .to("Person", "r")
        .select(|c| {
            Value::object([
                ("hops", c.column("r_depth")),
                ("path", c.column("r_path")),
            ])
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    rows.sort_by_key(|row| row.get("hops").as_i64());
    assert_eq!(
        rows[0].get("path"),
        Value::array([Value::from("p1"), Value::from("p2")])
    );
    assert_eq!(
        rows[1].get("path"),
        Value::array([Value::from("p1"), Value::from("p2"), Value::from("p3")])
    );
}

#[test]
fn cycle_prevention_stops_revisits() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice");
    person(&store, "p2", "Bob");
    knows(&store, "e1", "p1", "p2");
    knows(&store, "e2", "p2", "p1");

    let rows = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq("Alice"))
        .traverse("knows", "e")
        .recursive(Recursion::new().max_hops(5))
        .to("Person", "r")
        .select(|c| c.get("r", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    // With cycle prevention (the default) each node is reached once.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], Value::from("Bob"));
}

#[test]
fn cycle_allowance_is_bounded_by_max_hops() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice");
    person(&store, "p2", "Bob");
    knows(&store, "e1", "p1", "p2");
    knows(&store, "e2", "p2", "p1");

    let rows = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq("Alice"))
        .traverse("knows", "e")
        .recursive(Recursion::new().max_hops(4).allow_cycles().with_depth())
        .to("Person", "r")
        .select(|c| c.column("r_depth"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    // Alternating Bob/Alice/Bob/Alice, one row per hop.
    let mut depths: Vec<i64> = rows.iter().filter_map(|v| v.as_i64()).collect();
    depths.sort();
    assert_eq!(depths, vec![1, 2, 3, 4]);
}

#[test]
fn hop_bounds_are_validated() {
    let (engine, store) = setup();
    seed_chain(&store);

    let inverted = engine
        .from("Person", "p")
        .traverse("knows", "e")
        .recursive(Recursion::new().min_hops(3).max_hops(2))
        .to("Person", "r")
        .to_ast();
    assert!(inverted.is_err());

    let above_ceiling = engine
        .from("Person", "p")
        .traverse("knows", "e")
        .recursive(Recursion::new().max_hops(1000))
        .to("Person", "r")
        .to_ast();
    assert!(above_ceiling.is_err());
}
