#![allow(clippy::all)]

use std::sync::Arc;

use grafo::{
    agg, EdgeKindDef, GraphDef, GraphStore, Introspector, NodeKindDef, PropType, QueryEngine,
    SqliteBackend, SqliteDialect, Value, ValueType,
};

fn catalog_graph() -> GraphDef {
    GraphDef::new("catalog")
        .with_node(
            NodeKindDef::new("Book")
                .prop("title", PropType::string())
                .prop("pages", PropType::number())
                .prop("genre", PropType::enumeration(["fiction", "reference"]))
                .prop(
                    "publisher",
                    PropType::object([
                        ("name", PropType::string()),
                        ("city", PropType::string()),
                    ]),
                ),
        )
        .with_node(
            NodeKindDef::new("Magazine")
                .prop("title", PropType::string())
                .prop("pages", PropType::string())
                .prop(
                    "publisher",
                    PropType::object([
                        ("name", PropType::string()),
                        ("country", PropType::string()),
                    ]),
                ),
        )
        .with_edge(
            EdgeKindDef::new("cites", ["Book"], ["Book", "Magazine"])
                .prop("page", PropType::optional(PropType::number())),
        )
}

#[test]
fn same_scalar_types_intersect_to_themselves() {
    let intro = Introspector::new(Arc::new(catalog_graph()));
    let shared = intro
        .shared_field_type_info(&["Book", "Magazine"], "title")
        .expect("shared info");
    assert_eq!(shared.value_type, ValueType::String);
}

#[test]
fn diverging_scalar_types_share_nothing() {
    let intro = Introspector::new(Arc::new(catalog_graph()));
    assert!(intro
        .shared_field_type_info(&["Book", "Magazine"], "pages")
        .is_none());
}

#[test]
fn object_shapes_intersect_key_sets() {
    let intro = Introspector::new(Arc::new(catalog_graph()));
    let shared = intro
        .shared_field_type_info(&["Book", "Magazine"], "publisher")
        .expect("shared info");
    let shape = shared.shape.expect("shape survives");
    assert_eq!(shape.keys().collect::<Vec<_>>(), vec!["name"]);
}

#[test]
fn edge_fields_resolve_through_wrappers() {
    let intro = Introspector::new(Arc::new(catalog_graph()));
    let info = intro
        .edge_field_type_info("cites", "page")
        .expect("resolved");
    assert_eq!(info.value_type, ValueType::Number);
}

#[test]
fn enums_surface_as_strings() {
    let intro = Introspector::new(Arc::new(catalog_graph()));
    let info = intro.field_type_info("Book", "genre").expect("resolved");
    assert_eq!(info.value_type, ValueType::String);
}

#[test]
fn aggregates_group_and_filter() {
    let graph = GraphDef::new("catalog")
        .with_node(
            NodeKindDef::new("Book")
                .prop("title", PropType::string())
                .prop("genre", PropType::string())
                .prop("pages", PropType::number()),
        )
        .with_edge(EdgeKindDef::new("cites", ["Book"], ["Book"]));
    let backend = Arc::new(SqliteBackend::open_in_memory().expect("backend opens"));
    let store = GraphStore::open(Arc::clone(&backend), "catalog").expect("store opens");
    let engine = QueryEngine::new(graph, Arc::new(SqliteDialect::new()), backend);

    for (id, genre, pages) in [
        ("b1", "fiction", 200i64),
        ("b2", "fiction", 300),
        ("b3", "reference", 900),
    ] {
        store
            .insert_node(
                "Book",
                id,
                Value::object([
                    ("title", Value::from(id)),
                    ("genre", Value::from(genre)),
                    ("pages", Value::from(pages)),
                ]),
            )
            .expect("node inserted");
    }

    let totals = engine
        .from("Book", "b")
        .aggregate([("n", agg::count()), ("total", agg::sum("b", "pages"))])
        .expect("aggregate builds")
        .execute()
        .expect("aggregate runs");
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].get("n"), Value::from(3i64));
    assert_eq!(totals[0].get("total"), Value::from(1400i64));

    let mut grouped = engine
        .from("Book", "b")
        .group_by("b", "genre")
        .aggregate([("genre", agg::field("b", "genre")), ("n", agg::count())])
        .expect("aggregate builds")
        .execute()
        .expect("aggregate runs");
    grouped.sort_by_key(|row| row.get("genre").as_str().map(str::to_owned));
    assert_eq!(
        grouped,
        vec![
            Value::object([("genre", Value::from("fiction")), ("n", Value::from(2i64))]),
            Value::object([
                ("genre", Value::from("reference")),
                ("n", Value::from(1i64)),
            ]),
        ]
    );

    let frequent = engine
        .from("Book", "b")
        .group_by("b", "genre")
        .having(|h| h.count().gte(2))
        .aggregate([("genre", agg::field("b", "genre")), ("n", agg::count())])
        .expect("aggregate builds")
        .execute()
        .expect("aggregate runs");
    assert_eq!(frequent.len(), 1);
    assert_eq!(frequent[0].get("genre"), Value::from("fiction"));
}

#[test]
fn object_path_predicates_use_shape_info() {
    let graph = catalog_graph();
    let backend = Arc::new(SqliteBackend::open_in_memory().expect("backend opens"));
    let store = GraphStore::open(Arc::clone(&backend), "catalog").expect("store opens");
    let engine = QueryEngine::new(graph, Arc::new(SqliteDialect::new()), backend);

    store
        .insert_node(
            "Book",
            "b1",
            Value::object([
                ("title", Value::from("Graphs")),
                ("pages", Value::from(1i64)),
                (
                    "publisher",
                    Value::object([
                        ("name", Value::from("AcmePress")),
                        ("city", Value::from("Lisbon")),
                    ]),
                ),
            ]),
        )
        .expect("node inserted");

    let rows = engine
        .from("Book", "b")
        .where_node("b", |b| {
            b.field("publisher").path_equals(["city"], "Lisbon")
        })
        .select(|c| c.get("b", "title"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(rows, vec![Value::from("Graphs")]);

    let nested_get = engine
        .from("Book", "b")
        .where_node("b", |b| b.field("publisher").get("name").eq("AcmePress"))
        .select(|c| c.get("b", "title"))
        .expect("query builds")
        .execute()
        .expect("query runs");
    assert_eq!(nested_get, vec![Value::from("Graphs")]);
}
