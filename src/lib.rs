#![forbid(unsafe_code)]

//! # Grafo - Typed Property-Graph Query Engine
//!
//! Grafo stores nodes and typed edges in a relational backend and exposes a
//! composable, schema-aware query API. Queries are built fluently, compiled
//! to SQL for a configurable dialect, executed against a pluggable backend,
//! and mapped back into typed values.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use grafo::{
//!     GraphDef, GraphStore, NodeKindDef, EdgeKindDef, PropType, QueryEngine,
//!     SortDirection, SqliteBackend, SqliteDialect, Value,
//! };
//!
//! let graph = GraphDef::new("social")
//!     .with_node(
//!         NodeKindDef::new("Person")
//!             .prop("name", PropType::string())
//!             .prop("age", PropType::number()),
//!     )
//!     .with_edge(EdgeKindDef::new("knows", ["Person"], ["Person"]));
//!
//! let backend = Arc::new(SqliteBackend::open_in_memory()?);
//! let store = GraphStore::open(Arc::clone(&backend), "social")?;
//! store.insert_node("Person", "p1", Value::object([
//!     ("name", Value::from("Alice")),
//!     ("age", Value::from(30i64)),
//! ]))?;
//!
//! let engine = QueryEngine::new(graph, Arc::new(SqliteDialect::new()), backend);
//! let names = engine
//!     .from("Person", "p")
//!     .where_node("p", |p| p.field("age").gte(18))
//!     .order_by("p", "name", SortDirection::Asc)
//!     .select(|c| c.get("p", "name"))?
//!     .execute()?;
//! assert_eq!(names, vec![Value::from("Alice")]);
//! # Ok::<(), grafo::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - **Schema layer**: kind definitions, field type introspection, ontology
//!   expansion.
//! - **Query layer**: immutable AST, fluent builder, predicate DSL, cursors.
//! - **SQL layer**: dialect adapters (SQLite, Postgres) lowering the AST to
//!   parameterized statements.
//! - **Execution layer**: two-path execution (selective projection with a
//!   full-blob fallback), keyset pagination, streaming, prepared queries,
//!   set operations.

pub mod backend;
pub mod engine;
pub mod error;
pub mod exec;
pub mod logging;
pub mod query;
pub mod schema;
pub mod sql;
pub mod store;
pub mod value;

pub use crate::backend::{Backend, SqlRow, SqliteBackend};
pub use crate::engine::QueryEngine;
pub use crate::error::{Error, ErrorWithCode, Result};
pub use crate::exec::{
    ExecutableAggregateQuery, ExecutableQuery, Page, PageArgs, PreparedQuery, QueryExplain,
    QueryStream, SelectContext, UnionableQuery,
};
pub use crate::query::ast::{SortDirection, TemporalMode};
pub use crate::query::{
    agg, exists, not, not_exists, CursorData, CursorDirection, EdgeExpand, FromOptions,
    QueryBuilder, Recursion, SimilarOptions, ToOptions, TraverseOptions,
};
pub use crate::schema::{
    EdgeKindDef, FieldTypeInfo, GraphDef, InMemoryOntology, Introspector, NodeKindDef,
    OntologyRegistry, PropType, ValueType,
};
pub use crate::sql::{CompiledSql, Dialect, PostgresDialect, SqlValue, SqliteDialect};
pub use crate::store::GraphStore;
pub use crate::value::{param, Operand, Value};
