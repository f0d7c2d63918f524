//! Physical layout DDL and minimal node/edge seeding.
//!
//! The query engine only reads; this module provides the table layout the
//! projection contract assumes plus the insert helpers integration tests and
//! embedders use to load data. Full CRUD, migrations, and constraint
//! enforcement live outside the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::backend::{Backend, SqliteBackend};
use crate::error::Result;
use crate::sql::SqlValue;
use crate::value::Value;

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    graph_id TEXT NOT NULL,
    id TEXT NOT NULL,
    kind TEXT NOT NULL,
    props TEXT NOT NULL DEFAULT '{}',
    version INTEGER NOT NULL DEFAULT 1,
    valid_from TEXT,
    valid_to TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    PRIMARY KEY (graph_id, id)
);
CREATE TABLE IF NOT EXISTS edges (
    graph_id TEXT NOT NULL,
    id TEXT NOT NULL,
    kind TEXT NOT NULL,
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    props TEXT NOT NULL DEFAULT '{}',
    valid_from TEXT,
    valid_to TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    PRIMARY KEY (graph_id, id)
);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes (graph_id, kind);
CREATE INDEX IF NOT EXISTS idx_edges_kind ON edges (graph_id, kind);
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges (graph_id, from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges (graph_id, to_id);
";

/// Seeding facade over a SQLite backend.
pub struct GraphStore {
    backend: Arc<SqliteBackend>,
    graph_id: String,
    id_counter: AtomicU64,
}

impl GraphStore {
    /// Creates the physical tables if needed and returns the store.
    pub fn open(backend: Arc<SqliteBackend>, graph_id: impl Into<String>) -> Result<Self> {
        backend.execute_batch(SCHEMA_DDL)?;
        Ok(Self {
            backend,
            graph_id: graph_id.into(),
            id_counter: AtomicU64::new(1),
        })
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Inserts a node with an explicit id.
    pub fn insert_node(&self, kind: &str, id: &str, props: Value) -> Result<String> {
        let now = now_iso();
        let props_json = props.to_json().to_string();
        self.backend.execute_raw(
            "INSERT INTO nodes (graph_id, id, kind, props, version, valid_from, valid_to, \
             created_at, updated_at, deleted_at) VALUES (?, ?, ?, ?, 1, ?, NULL, ?, ?, NULL)",
            &[
                SqlValue::Text(self.graph_id.clone()),
                SqlValue::Text(id.to_owned()),
                SqlValue::Text(kind.to_owned()),
                SqlValue::Text(props_json),
                SqlValue::Text(now.clone()),
                SqlValue::Text(now.clone()),
                SqlValue::Text(now),
            ],
        )?;
        Ok(id.to_owned())
    }

    /// Inserts a node with a generated id.
    pub fn add_node(&self, kind: &str, props: Value) -> Result<String> {
        let id = self.next_id(kind);
        self.insert_node(kind, &id, props)
    }

    /// Inserts an edge with an explicit id.
    pub fn insert_edge(
        &self,
        kind: &str,
        id: &str,
        from_id: &str,
        to_id: &str,
        props: Value,
    ) -> Result<String> {
        let now = now_iso();
        let props_json = props.to_json().to_string();
        self.backend.execute_raw(
            "INSERT INTO edges (graph_id, id, kind, from_id, to_id, props, valid_from, \
             valid_to, created_at, updated_at, deleted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL)",
            &[
                SqlValue::Text(self.graph_id.clone()),
                SqlValue::Text(id.to_owned()),
                SqlValue::Text(kind.to_owned()),
                SqlValue::Text(from_id.to_owned()),
                SqlValue::Text(to_id.to_owned()),
                SqlValue::Text(props_json),
                SqlValue::Text(now.clone()),
                SqlValue::Text(now.clone()),
                SqlValue::Text(now),
            ],
        )?;
        Ok(id.to_owned())
    }

    /// Inserts an edge with a generated id.
    pub fn add_edge(
        &self,
        kind: &str,
        from_id: &str,
        to_id: &str,
        props: Value,
    ) -> Result<String> {
        let id = self.next_id(kind);
        self.insert_edge(kind, &id, from_id, to_id, props)
    }

    /// Soft-deletes a node, keeping the row for `TemporalMode::All` queries.
    pub fn tombstone_node(&self, id: &str) -> Result<()> {
        let now = now_iso();
        self.backend.execute_raw(
            "UPDATE nodes SET deleted_at = ? WHERE graph_id = ? AND id = ?",
            &[
                SqlValue::Text(now),
                SqlValue::Text(self.graph_id.clone()),
                SqlValue::Text(id.to_owned()),
            ],
        )?;
        Ok(())
    }

    fn next_id(&self, kind: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{kind}-{n}")
    }
}

fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_nodes_and_edges() {
        let backend = Arc::new(SqliteBackend::open_in_memory().expect("opens"));
        let store = GraphStore::open(Arc::clone(&backend), "g").expect("schema created");
        let alice = store
            .insert_node("Person", "p1", Value::object([("name", Value::from("Alice"))]))
            .expect("node inserted");
        let bob = store.add_node("Person", Value::object([("name", Value::from("Bob"))]))
            .expect("node inserted");
        store
            .add_edge("knows", &alice, &bob, Value::Object(Default::default()))
            .expect("edge inserted");

        let rows = backend
            .execute_raw("SELECT COUNT(*) AS c FROM nodes", &[])
            .expect("count runs");
        assert_eq!(rows[0].get("c"), Some(&SqlValue::Integer(2)));
        let rows = backend
            .execute_raw("SELECT from_id, to_id FROM edges", &[])
            .expect("select runs");
        assert_eq!(rows[0].get("from_id"), Some(&SqlValue::Text("p1".into())));
    }
}
