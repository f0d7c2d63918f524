//! Graph, node-kind, and edge-kind definitions.
//!
//! A [`GraphDef`] is the complete schema input to the engine: node and edge
//! kinds keyed by name, plus the ontology registry used for subclass and
//! edge-implication expansion. Property schemas are declared through the
//! [`PropType`] constructor tree; wrapper constructors (optional, nullable,
//! defaulted, read-only, unions) are unwrapped by the introspector.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::ontology::{InMemoryOntology, OntologyRegistry};
use crate::value::Value;

/// Property schema constructor tree.
#[derive(Clone, Debug, PartialEq)]
pub enum PropType {
    String,
    Number,
    Boolean,
    Date,
    /// A single literal value; its scalar type is inferred at introspection.
    Literal(Value),
    /// A closed set of literal values.
    Enum(Vec<Value>),
    Array(Box<PropType>),
    Object(BTreeMap<String, PropType>),
    /// Dictionary-like object whose values share one schema.
    Record(Box<PropType>),
    Embedding {
        dimensions: usize,
    },
    Optional(Box<PropType>),
    Nullable(Box<PropType>),
    WithDefault(Box<PropType>, Value),
    ReadOnly(Box<PropType>),
    /// Pipe of alternative schemas.
    Union(Vec<PropType>),
    Unknown,
}

impl PropType {
    pub fn string() -> Self {
        PropType::String
    }

    pub fn number() -> Self {
        PropType::Number
    }

    pub fn boolean() -> Self {
        PropType::Boolean
    }

    pub fn date() -> Self {
        PropType::Date
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        PropType::Literal(value.into())
    }

    pub fn enumeration<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        PropType::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn array(element: PropType) -> Self {
        PropType::Array(Box::new(element))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, PropType)>) -> Self {
        PropType::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn record(value: PropType) -> Self {
        PropType::Record(Box::new(value))
    }

    pub fn embedding(dimensions: usize) -> Self {
        PropType::Embedding { dimensions }
    }

    pub fn optional(inner: PropType) -> Self {
        PropType::Optional(Box::new(inner))
    }

    pub fn nullable(inner: PropType) -> Self {
        PropType::Nullable(Box::new(inner))
    }

    pub fn with_default(inner: PropType, value: impl Into<Value>) -> Self {
        PropType::WithDefault(Box::new(inner), value.into())
    }

    pub fn read_only(inner: PropType) -> Self {
        PropType::ReadOnly(Box::new(inner))
    }

    pub fn union(alternatives: impl IntoIterator<Item = PropType>) -> Self {
        PropType::Union(alternatives.into_iter().collect())
    }
}

/// Declared node kind: a name plus its property schemas.
#[derive(Clone, Debug)]
pub struct NodeKindDef {
    pub name: String,
    pub props: BTreeMap<String, PropType>,
}

impl NodeKindDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: BTreeMap::new(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, schema: PropType) -> Self {
        self.props.insert(name.into(), schema);
        self
    }
}

/// Declared edge kind: a name, property schemas, and endpoint kind lists.
///
/// Both endpoint lists are non-empty; either side may admit several kinds.
#[derive(Clone, Debug)]
pub struct EdgeKindDef {
    pub name: String,
    pub props: BTreeMap<String, PropType>,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

impl EdgeKindDef {
    pub fn new(
        name: impl Into<String>,
        from: impl IntoIterator<Item = impl Into<String>>,
        to: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            props: BTreeMap::new(),
            from: from.into_iter().map(Into::into).collect(),
            to: to.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, schema: PropType) -> Self {
        self.props.insert(name.into(), schema);
        self
    }
}

/// Complete graph definition handed to the engine.
#[derive(Clone)]
pub struct GraphDef {
    pub id: String,
    pub nodes: BTreeMap<String, NodeKindDef>,
    pub edges: BTreeMap<String, EdgeKindDef>,
    pub ontology: Arc<dyn OntologyRegistry>,
}

impl GraphDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            ontology: Arc::new(InMemoryOntology::new()),
        }
    }

    pub fn with_node(mut self, def: NodeKindDef) -> Self {
        self.nodes.insert(def.name.clone(), def);
        self
    }

    pub fn with_edge(mut self, def: EdgeKindDef) -> Self {
        self.edges.insert(def.name.clone(), def);
        self
    }

    pub fn with_ontology(mut self, ontology: Arc<dyn OntologyRegistry>) -> Self {
        self.ontology = ontology;
        self
    }

    pub fn node(&self, kind: &str) -> Option<&NodeKindDef> {
        self.nodes.get(kind)
    }

    pub fn edge(&self, kind: &str) -> Option<&EdgeKindDef> {
        self.edges.get(kind)
    }

    /// Expands a node kind to itself plus its subclasses, in stable order.
    pub fn expand_node_kind(&self, kind: &str, include_sub_classes: bool) -> Vec<String> {
        let mut kinds = vec![kind.to_owned()];
        if include_sub_classes {
            for sub in self.ontology.expand_sub_classes(kind) {
                if !kinds.contains(&sub) {
                    kinds.push(sub);
                }
            }
        }
        kinds
    }
}

impl std::fmt::Debug for GraphDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDef")
            .field("id", &self.id)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .finish()
    }
}
