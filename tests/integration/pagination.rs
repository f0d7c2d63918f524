#![allow(clippy::all)]

use std::sync::Arc;

use grafo::{
    CursorData, EdgeKindDef, GraphDef, GraphStore, NodeKindDef, PageArgs, PropType, QueryEngine,
    SortDirection, SqliteBackend, SqliteDialect, Value,
};
use proptest::prelude::*;

fn setup() -> (QueryEngine, GraphStore) {
    let graph = GraphDef::new("social")
        .with_node(
            NodeKindDef::new("Person")
                .prop("name", PropType::string())
                .prop("age", PropType::number())
                .prop("score", PropType::optional(PropType::number()))
                .prop(
                    "profile",
                    PropType::optional(PropType::object([("rank", PropType::number())])),
                ),
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

fn names_query(engine: &QueryEngine) -> grafo::ExecutableQuery {
    engine
        .from("Person", "p")
        .order_by("p", "age", SortDirection::Asc)
        .select(|c| Value::object([("n", c.get("p", "name"))]))
        .expect("query builds")
}

fn name_of(item: &Value) -> String {
    item.get("n").as_str().expect("name present").to_owned()
}

#[test]
fn forward_pages_enumerate_in_order() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);
    person(&store, "p4", "Dave", 35);

    let query = names_query(&engine);
    let page1 = query.paginate(PageArgs::first(2)).expect("page 1");
    assert_eq!(
        page1.items.iter().map(name_of).collect::<Vec<_>>(),
        vec!["Bob", "Alice"]
    );
    assert!(page1.has_next_page);
    assert!(!page1.has_prev_page);

    let cursor = page1.next_cursor.expect("next cursor");
    let page2 = query
        .paginate(PageArgs::first_after(2, cursor))
        .expect("page 2");
    assert_eq!(
        page2.items.iter().map(name_of).collect::<Vec<_>>(),
        vec!["Dave", "Carol"]
    );
    assert!(!page2.has_next_page);
    assert!(page2.has_prev_page);
}

#[test]
fn page_enumeration_matches_unpaged_query() {
    let (engine, store) = setup();
    for i in 0..17i64 {
        person(&store, &format!("p{i}"), &format!("P{i:02}"), 100 - i);
    }
    let query = names_query(&engine);
    let all: Vec<String> = query
        .execute()
        .expect("full run")
        .iter()
        .map(name_of)
        .collect();

    let mut paged: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let args = match cursor.take() {
            Some(cursor) => PageArgs::first_after(5, cursor),
            None => PageArgs::first(5),
        };
        let page = query.paginate(args).expect("page fetch");
        paged.extend(page.items.iter().map(name_of));
        if !page.has_next_page {
            break;
        }
        cursor = page.next_cursor;
    }
    assert_eq!(paged, all);
}

#[test]
fn backward_pagination_returns_the_previous_page() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);
    person(&store, "p3", "Carol", 40);
    person(&store, "p4", "Dave", 35);

    let query = names_query(&engine);
    let page1 = query.paginate(PageArgs::first(2)).expect("page 1");
    let page2 = query
        .paginate(PageArgs::first_after(2, page1.next_cursor.clone().expect("cursor")))
        .expect("page 2");
    let back = query
        .paginate(PageArgs::last_before(
            2,
            page2.prev_cursor.expect("prev cursor"),
        ))
        .expect("backward page");
    assert_eq!(
        back.items.iter().map(name_of).collect::<Vec<_>>(),
        page1.items.iter().map(name_of).collect::<Vec<_>>()
    );
}

#[test]
fn multi_column_order_breaks_ties() {
    let (engine, store) = setup();
    person(&store, "p1", "Zoe", 30);
    person(&store, "p2", "Amy", 30);
    person(&store, "p3", "Mia", 25);

    let query = engine
        .from("Person", "p")
        .order_by("p", "age", SortDirection::Asc)
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| Value::object([("n", c.get("p", "name"))]))
        .expect("query builds");

    let page1 = query.paginate(PageArgs::first(2)).expect("page 1");
    assert_eq!(
        page1.items.iter().map(name_of).collect::<Vec<_>>(),
        vec!["Mia", "Amy"]
    );
    let page2 = query
        .paginate(PageArgs::first_after(2, page1.next_cursor.expect("cursor")))
        .expect("page 2");
    assert_eq!(
        page2.items.iter().map(name_of).collect::<Vec<_>>(),
        vec!["Zoe"]
    );
}

#[test]
fn paginate_requires_order_by() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    let query = engine
        .from("Person", "p")
        .select(|c| c.get("p", "name"))
        .expect("query builds");
    let error = query.paginate(PageArgs::first(2)).expect_err("must fail");
    assert_eq!(error.code(), "ValidationError");
}

#[test]
fn cursor_from_another_query_is_rejected() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    person(&store, "p2", "Bob", 25);

    let by_age = names_query(&engine);
    let page = by_age.paginate(PageArgs::first(1)).expect("page");
    let cursor = page.next_cursor.expect("cursor");

    let by_name = engine
        .from("Person", "p")
        .order_by("p", "name", SortDirection::Asc)
        .select(|c| Value::object([("n", c.get("p", "name"))]))
        .expect("query builds");
    let error = by_name
        .paginate(PageArgs::first_after(1, cursor))
        .expect_err("must fail");
    assert_eq!(error.code(), "ValidationError");
}

#[test]
fn mixed_direction_arguments_are_rejected() {
    let (engine, store) = setup();
    person(&store, "p1", "Alice", 30);
    let query = names_query(&engine);
    let args = PageArgs {
        first: Some(2),
        last: Some(2),
        ..PageArgs::default()
    };
    assert!(query.paginate(args).is_err());
}

#[test]
fn stream_drains_every_row_in_order() {
    let (engine, store) = setup();
    for i in 0..23i64 {
        person(&store, &format!("p{i}"), &format!("P{i:02}"), i);
    }
    let query = names_query(&engine);
    let streamed: Vec<String> = query
        .stream(4)
        .expect("stream starts")
        .map(|item| name_of(&item.expect("row maps")))
        .collect();
    let expected: Vec<String> = (0..23).map(|i| format!("P{i:02}")).collect();
    assert_eq!(streamed, expected);
}

#[test]
fn nested_order_paths_paginate_on_the_fallback_plan() {
    let (engine, store) = setup();
    for (id, name, rank) in [("p1", "Alice", 3i64), ("p2", "Bob", 1), ("p3", "Carol", 2)] {
        store
            .insert_node(
                "Person",
                id,
                Value::object([
                    ("name", Value::from(name)),
                    ("age", Value::from(30i64)),
                    (
                        "profile",
                        Value::object([("rank", Value::from(rank))]),
                    ),
                ]),
            )
            .expect("node inserted");
    }

    // Deep ORDER BY paths are ineligible for the selective pagination plan;
    // the full-blob path must still produce correct pages.
    let query = engine
        .from("Person", "p")
        .order_by_path("p", ["profile", "rank"], SortDirection::Asc)
        .select(|c| Value::object([("n", c.get("p", "name"))]))
        .expect("query builds");

    let page1 = query.paginate(PageArgs::first(2)).expect("page 1");
    assert_eq!(
        page1.items.iter().map(name_of).collect::<Vec<_>>(),
        vec!["Bob", "Carol"]
    );
    let page2 = query
        .paginate(PageArgs::first_after(2, page1.next_cursor.expect("cursor")))
        .expect("page 2");
    assert_eq!(
        page2.items.iter().map(name_of).collect::<Vec<_>>(),
        vec!["Alice"]
    );
}

#[test]
fn stream_requires_order_by() {
    let (engine, _store) = setup();
    let query = engine
        .from("Person", "p")
        .select(|c| c.get("p", "name"))
        .expect("query builds");
    assert!(query.stream(10).is_err());
}

proptest! {
    #[test]
    fn cursor_round_trip_preserves_data(
        vals in proptest::collection::vec(-1_000_000i64..1_000_000, 0..6),
        raw_cols in proptest::collection::vec("[a-z]{1,8}", 0..6),
    ) {
        let cols: Vec<String> = raw_cols
            .iter()
            .take(vals.len())
            .map(|c| format!("p.{c}"))
            .collect();
        let vals: Vec<serde_json::Value> = vals
            .iter()
            .take(cols.len())
            .map(|v| serde_json::Value::from(*v))
            .collect();
        let cursor = CursorData::new(grafo::CursorDirection::Forward, vals, cols);
        let encoded = cursor.encode();
        prop_assert!(!encoded.contains('+'));
        prop_assert!(!encoded.contains('/'));
        prop_assert!(!encoded.contains('='));
        let decoded = CursorData::decode(&encoded).expect("decodes");
        prop_assert_eq!(decoded, cursor);
    }
}
