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
                .prop("age", PropType::number())
                .prop("secret", PropType::optional(PropType::string()))
                .prop("tags", PropType::optional(PropType::array(PropType::string()))),
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

#[test]
fn selective_result_matches_full_blob_result() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);

    // A field-reading callback runs on the selective path.
    let selective = engine
        .from("Person", "p")
        .order_by("p", "age", SortDirection::Asc)
        .select(|c| {
            Value::object([
                ("name", c.get("p", "name")),
                ("age", c.get("p", "age")),
            ])
        })
        .expect("query builds");
    assert!(selective.explain().expect("explain").optimized_sql.is_some());
    let optimized = selective.execute().expect("optimized runs");

    // A whole-entity callback forces the full-blob path; shape differs but
    // the shared fields must agree.
    let full = engine
        .from("Person", "p")
        .order_by("p", "age", SortDirection::Asc)
        .select(|c| match c.node("p") {
            Some(node) => node.value(),
            None => Value::Null,
        })
        .expect("query builds");
    assert!(full.explain().expect("explain").optimized_sql.is_none());
    let blobs = full.execute().expect("full runs");

    assert_eq!(optimized.len(), blobs.len());
    for (thin, blob) in optimized.iter().zip(&blobs) {
        assert_eq!(thin.get("name"), blob.get("name"));
        assert_eq!(thin.get("age"), blob.get("age"));
    }
}

#[test]
fn whole_entity_selection_returns_complete_nodes() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let rows = engine
        .from("Person", "p")
        .select(|c| match c.node("p") {
            Some(node) => Value::object([("whole", node.value())]),
            None => Value::Null,
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows.len(), 1);
    let whole = rows[0].get("whole");
    assert_eq!(whole.get("id"), Value::from("p1"));
    assert_eq!(whole.get("kind"), Value::from("Person"));
    assert_eq!(whole.get("name"), Value::from("Alice"));
    assert_eq!(whole.get("age"), Value::from(30i64));
    let meta = whole.get("meta");
    assert_eq!(meta.get("version"), Value::from(1i64));
    assert!(!meta.get("created_at").is_null());
}

#[test]
fn value_dependent_reads_fall_back_to_full_blobs() {
    let (engine, store) = setup();
    store
        .insert_node(
            "Person",
            "p1",
            Value::object([
                ("name", Value::from("Alice")),
                ("age", Value::from(77i64)),
                ("secret", Value::from("hidden")),
            ]),
        )
        .expect("node inserted");

    // Tracking sees ages 0/1/1000000, so `secret` never records; the real
    // row takes the age==77 branch and the selective row plan cannot serve
    // it. The executor must fall back and still produce the right answer.
    let rows = engine
        .from("Person", "p")
        .select(|c| {
            if c.get("p", "age").as_i64() == Some(77) {
                c.get("p", "secret")
            } else {
                Value::Null
            }
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows, vec![Value::from("hidden")]);
}

#[test]
fn meta_reads_travel_through_the_selective_plan() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let rows = engine
        .from("Person", "p")
        .select(|c| match c.node("p") {
            Some(node) => Value::object([
                ("name", node.get("name")),
                ("version", node.meta().version()),
            ]),
            None => Value::Null,
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows[0].get("version"), Value::from(1i64));
    assert_eq!(rows[0].get("name"), Value::from("Alice"));
}

#[test]
fn compound_props_decode_on_the_selective_path() {
    let (engine, store) = setup();
    store
        .insert_node(
            "Person",
            "p1",
            Value::object([
                ("name", Value::from("Alice")),
                ("age", Value::from(30i64)),
                ("tags", Value::array([Value::from("a"), Value::from("b")])),
            ]),
        )
        .expect("node inserted");

    let rows = engine
        .from("Person", "p")
        .select(|c| c.get("p", "tags"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(
        rows,
        vec![Value::array([Value::from("a"), Value::from("b")])]
    );
}

#[test]
fn absent_optional_alias_is_detectable_on_the_selective_path() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    store
        .insert_edge("knows", "e1", "p1", "p2", Value::Object(Default::default()))
        .expect("edge inserted");

    let query = engine
        .from("Person", "p")
        .optional_traverse("knows", "e")
        .to("Person", "f")
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| {
            Value::object([
                ("who", c.get("p", "name")),
                (
                    "knows_someone",
                    Value::Bool(c.node("f").is_some()),
                ),
            ])
        })
        .expect("query builds");
    assert!(query.explain().expect("explain").optimized_sql.is_some());

    let rows = query.execute().expect("query runs");
    assert_eq!(
        rows,
        vec![
            Value::object([
                ("who", Value::from("Alice")),
                ("knows_someone", Value::Bool(true)),
            ]),
            Value::object([
                ("who", Value::from("Bob")),
                ("knows_someone", Value::Bool(false)),
            ]),
        ]
    );
}
