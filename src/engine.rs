//! Engine facade wiring a graph definition, dialect, and backend together.

use std::sync::Arc;

use crate::backend::Backend;
use crate::query::builder::{FromOptions, QueryBuilder};
use crate::schema::{GraphDef, Introspector};
use crate::sql::Dialect;

/// Shared engine internals handed to builders and executable queries.
///
/// Everything here is immutable after construction and safe to read from
/// multiple tasks without locking.
pub struct EngineCore {
    pub graph: Arc<GraphDef>,
    pub introspector: Arc<Introspector>,
    pub dialect: Arc<dyn Dialect>,
    pub backend: Arc<dyn Backend>,
}

/// Entry point for building and running graph queries.
#[derive(Clone)]
pub struct QueryEngine {
    core: Arc<EngineCore>,
}

impl QueryEngine {
    pub fn new(graph: GraphDef, dialect: Arc<dyn Dialect>, backend: Arc<dyn Backend>) -> Self {
        let graph = Arc::new(graph);
        let introspector = Arc::new(Introspector::new(Arc::clone(&graph)));
        Self {
            core: Arc::new(EngineCore {
                graph,
                introspector,
                dialect,
                backend,
            }),
        }
    }

    pub fn graph(&self) -> &Arc<GraphDef> {
        &self.core.graph
    }

    pub fn introspector(&self) -> &Arc<Introspector> {
        &self.core.introspector
    }

    /// Roots a query at a node kind.
    pub fn from(&self, kind: &str, alias: &str) -> QueryBuilder {
        self.from_with(kind, alias, FromOptions::default())
    }

    /// Roots a query at a node kind, optionally expanding subclasses.
    pub fn from_with(&self, kind: &str, alias: &str, options: FromOptions) -> QueryBuilder {
        QueryBuilder::start(Arc::clone(&self.core), kind, alias, options)
    }
}
