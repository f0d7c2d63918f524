//! Ontology lookup interface.
//!
//! The engine consumes closures over the ontology (subclasses, implied
//! edges, inverse edges) through this registry; computing those closures is
//! the ontology layer's concern, not the query engine's.

use std::collections::BTreeMap;

/// Lookup surface the builder uses for kind expansion.
pub trait OntologyRegistry: Send + Sync {
    /// All transitive subclasses of `kind`, excluding `kind` itself.
    fn expand_sub_classes(&self, kind: &str) -> Vec<String>;

    /// All narrower edge kinds implied by `edge_kind`, excluding itself.
    fn expand_implying_edges(&self, edge_kind: &str) -> Vec<String>;

    /// The declared inverse of `edge_kind`, if any.
    fn get_inverse_edge(&self, edge_kind: &str) -> Option<String>;
}

/// Table-backed registry, suitable for tests and embedded use.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOntology {
    sub_classes: BTreeMap<String, Vec<String>>,
    implying: BTreeMap<String, Vec<String>>,
    inverse: BTreeMap<String, String>,
}

impl InMemoryOntology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sub_class(mut self, parent: impl Into<String>, child: impl Into<String>) -> Self {
        self.sub_classes
            .entry(parent.into())
            .or_default()
            .push(child.into());
        self
    }

    pub fn with_implying_edge(
        mut self,
        broader: impl Into<String>,
        narrower: impl Into<String>,
    ) -> Self {
        self.implying
            .entry(broader.into())
            .or_default()
            .push(narrower.into());
        self
    }

    pub fn with_inverse_edge(
        mut self,
        edge_kind: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        self.inverse.insert(edge_kind.into(), inverse.into());
        self
    }

    fn closure(table: &BTreeMap<String, Vec<String>>, root: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut pending = vec![root.to_owned()];
        while let Some(current) = pending.pop() {
            if let Some(children) = table.get(&current) {
                for child in children {
                    if child != root && !out.contains(child) {
                        out.push(child.clone());
                        pending.push(child.clone());
                    }
                }
            }
        }
        out
    }
}

impl OntologyRegistry for InMemoryOntology {
    fn expand_sub_classes(&self, kind: &str) -> Vec<String> {
        Self::closure(&self.sub_classes, kind)
    }

    fn expand_implying_edges(&self, edge_kind: &str) -> Vec<String> {
        Self::closure(&self.implying, edge_kind)
    }

    fn get_inverse_edge(&self, edge_kind: &str) -> Option<String> {
        self.inverse.get(edge_kind).cloned()
    }
}
