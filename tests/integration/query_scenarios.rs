#![allow(clippy::all)]

use std::sync::Arc;

use grafo::{
    exists, EdgeKindDef, GraphDef, GraphStore, NodeKindDef, PropType, QueryEngine,
    SimilarOptions, SortDirection, SqliteBackend, SqliteDialect, TemporalMode, Value,
};

fn social_graph() -> GraphDef {
    GraphDef::new("social")
        .with_node(
            NodeKindDef::new("Person")
                .prop("name", PropType::string())
                .prop("age", PropType::number())
                .prop("tags", PropType::optional(PropType::array(PropType::string())))
                .prop("vec", PropType::optional(PropType::embedding(2))),
        )
        .with_edge(
            EdgeKindDef::new("knows", ["Person"], ["Person"])
                .prop("since", PropType::optional(PropType::string())),
        )
}

fn setup() -> (QueryEngine, GraphStore) {
    let backend = Arc::new(SqliteBackend::open_in_memory().expect("backend opens"));
    let store = GraphStore::open(Arc::clone(&backend), "social").expect("store opens");
    let engine = QueryEngine::new(social_graph(), Arc::new(SqliteDialect::new()), backend);
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
fn filter_and_projection() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let rows = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("age").gt(28))
        .order_by("p", "age", SortDirection::Asc)
        .select(|c| Value::object([("n", c.get("p", "name"))]))
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(
        rows,
        vec![
            Value::object([("n", Value::from("Alice"))]),
            Value::object([("n", Value::from("Carol"))]),
        ]
    );
}

#[test]
fn traversal_joins_matching_edges() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);
    store
        .insert_edge("knows", "e1", "p1", "p2", Value::Object(Default::default()))
        .expect("edge inserted");
    store
        .insert_edge("knows", "e2", "p1", "p3", Value::Object(Default::default()))
        .expect("edge inserted");

    let rows = engine
        .from("Person", "p")
        .traverse("knows", "e")
        .to("Person", "f")
        .order_by("f", "name", SortDirection::Asc)
        .select(|c| {
            Value::object([
                ("self", c.get("p", "name")),
                ("friend", c.get("f", "name")),
            ])
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(
        rows,
        vec![
            Value::object([
                ("self", Value::from("Alice")),
                ("friend", Value::from("Bob")),
            ]),
            Value::object([
                ("self", Value::from("Alice")),
                ("friend", Value::from("Carol")),
            ]),
        ]
    );
}

#[test]
fn optional_traversal_with_absent_edge() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);
    store
        .insert_edge("knows", "e1", "p1", "p2", Value::Object(Default::default()))
        .expect("edge inserted");

    let rows = engine
        .from("Person", "p")
        .optional_traverse("knows", "e")
        .to("Person", "f")
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| {
            Value::object([
                ("self", c.get("p", "name")),
                (
                    "friend",
                    match c.node("f") {
                        Some(friend) => friend.get("name"),
                        None => Value::from("—"),
                    },
                ),
            ])
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(
        rows,
        vec![
            Value::object([
                ("self", Value::from("Alice")),
                ("friend", Value::from("Bob")),
            ]),
            Value::object([
                ("self", Value::from("Bob")),
                ("friend", Value::from("—")),
            ]),
            Value::object([
                ("self", Value::from("Carol")),
                ("friend", Value::from("—")),
            ]),
        ]
    );
}

#[test]
fn edge_predicates_filter_traversals() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);
    store
        .insert_edge(
            "knows",
            "e1",
            "p1",
            "p2",
            Value::object([("since", Value::from("2019"))]),
        )
        .expect("edge inserted");
    store
        .insert_edge("knows", "e2", "p1", "p3", Value::Object(Default::default()))
        .expect("edge inserted");

    let rows = engine
        .from("Person", "p")
        .traverse("knows", "e")
        .to("Person", "f")
        .where_edge("e", |e| e.field("since").is_not_null())
        .select(|c| c.get("f", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows, vec![Value::from("Bob")]);
}

#[test]
fn string_and_list_operations() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let contains = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").contains("li"))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(contains, vec![Value::from("Alice")]);

    let starts = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").starts_with("Car"))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(starts, vec![Value::from("Carol")]);

    let listed = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").in_list(["Bob", "Carol"]))
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(listed, vec![Value::from("Bob"), Value::from("Carol")]);
}

#[test]
fn array_membership_operations() {
    let (engine, store) = setup();
    store
        .insert_node(
            "Person",
            "p1",
            Value::object([
                ("name", Value::from("Alice")),
                ("age", Value::from(30i64)),
                (
                    "tags",
                    Value::array([Value::from("rust"), Value::from("graphs")]),
                ),
            ]),
        )
        .expect("node inserted");
    person(&store, "p2", "Bob", 25);

    let tagged = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("tags").contains("rust"))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(tagged, vec![Value::from("Alice")]);

    let both = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("tags").contains_all(["rust", "graphs"]))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(both, vec![Value::from("Alice")]);
}

#[test]
fn vector_similarity_orders_by_distance() {
    let (engine, store) = setup();
    store
        .insert_node(
            "Person",
            "p1",
            Value::object([
                ("name", Value::from("East")),
                ("age", Value::from(1i64)),
                ("vec", Value::array([Value::from(1.0), Value::from(0.0)])),
            ]),
        )
        .expect("node inserted");
    store
        .insert_node(
            "Person",
            "p2",
            Value::object([
                ("name", Value::from("North")),
                ("age", Value::from(2i64)),
                ("vec", Value::array([Value::from(0.0), Value::from(1.0)])),
            ]),
        )
        .expect("node inserted");
    store
        .insert_node(
            "Person",
            "p3",
            Value::object([
                ("name", Value::from("NorthEast")),
                ("age", Value::from(3i64)),
                ("vec", Value::array([Value::from(0.7), Value::from(0.7)])),
            ]),
        )
        .expect("node inserted");

    let rows = engine
        .from("Person", "p")
        .where_node("p", |p| {
            p.field("vec")
                .similar_to([1.0, 0.0], 2, SimilarOptions::default())
        })
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows, vec![Value::from("East"), Value::from("NorthEast")]);
}

#[test]
fn vector_min_score_filters_rows() {
    let (engine, store) = setup();
    store
        .insert_node(
            "Person",
            "p1",
            Value::object([
                ("name", Value::from("East")),
                ("age", Value::from(1i64)),
                ("vec", Value::array([Value::from(1.0), Value::from(0.0)])),
            ]),
        )
        .expect("node inserted");
    store
        .insert_node(
            "Person",
            "p2",
            Value::object([
                ("name", Value::from("North")),
                ("age", Value::from(2i64)),
                ("vec", Value::array([Value::from(0.0), Value::from(1.0)])),
            ]),
        )
        .expect("node inserted");

    let rows = engine
        .from("Person", "p")
        .where_node("p", |p| {
            p.field("vec").similar_to(
                [1.0, 0.0],
                10,
                SimilarOptions {
                    min_score: Some(0.9),
                    ..SimilarOptions::default()
                },
            )
        })
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows, vec![Value::from("East")]);
}

#[test]
fn temporal_modes_control_tombstone_visibility() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    store.tombstone_node("p2").expect("tombstone applied");

    let current = engine
        .from("Person", "p")
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(current, vec![Value::from("Alice")]);

    let all = engine
        .from("Person", "p")
        .temporal(TemporalMode::All)
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(all, vec![Value::from("Alice"), Value::from("Bob")]);
}

#[test]
fn subquery_membership() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);

    let elders = engine
        .from("Person", "q")
        .where_node("q", |q| q.field("age").gt(28))
        .to_ast()
        .expect("subquery builds");

    let rows = engine
        .from("Person", "p")
        .where_node("p", move |p| p.id().in_subquery(elders.clone()))
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(rows, vec![Value::from("Alice"), Value::from("Carol")]);
}

#[test]
fn exists_gates_the_whole_result() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let nobody = engine
        .from("Person", "q")
        .where_node("q", |q| q.field("age").gt(90))
        .to_ast()
        .expect("subquery builds");

    let rows = engine
        .from("Person", "p")
        .where_node("p", move |_| exists(nobody.clone()))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert!(rows.is_empty());
}

#[test]
fn count_and_first_helpers() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);

    let query = engine
        .from("Person", "p")
        .order_by("p", "age", SortDirection::Asc)
        .select(|c| c.get("p", "name"))
        .expect("query builds");
    assert_eq!(query.count().expect("count runs"), 2);
    assert_eq!(
        query.first().expect("first runs"),
        Some(Value::from("Bob"))
    );
}

#[test]
fn explain_reports_compiled_sql() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let query = engine
        .from("Person", "p")
        .select(|c| c.get("p", "name"))
        .expect("query builds");
    let explain = query.explain().expect("explain runs");
    assert_eq!(explain.dialect, "sqlite");
    assert!(explain.sql.contains("WITH cte_p"));
    assert!(explain.param_count >= 2);
    assert!(explain.optimized_sql.is_some());
}

#[test]
fn execute_rejects_parameter_references() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    let query = engine
        .from("Person", "p")
        .where_node("p", |p| p.field("name").eq(grafo::param("n")))
        .select(|c| c.get("p", "age"))
        .expect("query builds");
    let error = query.execute().expect_err("must fail");
    assert_eq!(error.code(), "ValidationError");
}

#[test]
fn edge_system_fields_are_selectable() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    store
        .insert_edge(
            "knows",
            "e1",
            "p1",
            "p2",
            Value::object([("since", Value::from("2019"))]),
        )
        .expect("edge inserted");

    let rows = engine
        .from("Person", "p")
        .traverse("knows", "e")
        .to("Person", "f")
        .select(|c| match c.edge("e") {
            Some(edge) => Value::object([
                ("id", edge.id()),
                ("from", edge.from_id()),
                ("to", edge.to_id()),
                ("since", edge.get("since")),
                ("created", edge.meta().created_at()),
            ]),
            None => Value::Null,
        })
        .expect("query builds")
        .execute()
        .expect("query runs");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Value::from("e1"));
    assert_eq!(rows[0].get("from"), Value::from("p1"));
    assert_eq!(rows[0].get("to"), Value::from("p2"));
    assert_eq!(rows[0].get("since"), Value::from("2019"));
    assert!(!rows[0].get("created").is_null());
}

#[test]
fn as_of_queries_see_only_then_valid_rows() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);

    // Rows were created just now, so an asOf instant in the past sees
    // nothing and a future instant sees the row.
    let past = engine
        .from("Person", "p")
        .temporal(TemporalMode::AsOf("2000-01-01T00:00:00Z".to_owned()))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert!(past.is_empty());

    let future = engine
        .from("Person", "p")
        .temporal(TemporalMode::AsOf("2100-01-01T00:00:00Z".to_owned()))
        .select(|c| c.get("p", "name"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(future, vec![Value::from("Alice")]);
}
