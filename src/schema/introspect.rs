//! Schema introspection: per-field type resolution and cross-kind merging.
//!
//! The introspector walks declared property schemas, unwrapping optional /
//! nullable / defaulted / read-only / pipe wrappers until it reaches a
//! concrete constructor, and reduces every failure to "no info" so callers
//! fall back to untyped handling. Resolutions are memoized in a bounded
//! cache keyed by kind and field name.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::schema::def::{GraphDef, PropType};
use crate::schema::types::{FieldTypeInfo, ValueType};
use crate::value::Value;

const CACHE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
enum KindSpace {
    Node,
    Edge,
}

type CacheKey = (KindSpace, String, String);

/// Resolves field type info for the kinds of one graph definition.
pub struct Introspector {
    graph: Arc<GraphDef>,
    cache: Mutex<LruCache<CacheKey, Option<FieldTypeInfo>>>,
}

impl Introspector {
    pub fn new(graph: Arc<GraphDef>) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero cache capacity");
        Self {
            graph,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn graph(&self) -> &Arc<GraphDef> {
        &self.graph
    }

    /// Type info for a field on a node kind, if resolvable.
    pub fn field_type_info(&self, kind: &str, field: &str) -> Option<FieldTypeInfo> {
        self.lookup(KindSpace::Node, kind, field)
    }

    /// Type info for a field on an edge kind, if resolvable.
    pub fn edge_field_type_info(&self, kind: &str, field: &str) -> Option<FieldTypeInfo> {
        self.lookup(KindSpace::Edge, kind, field)
    }

    /// Info shared by every kind in `kinds` for `field`.
    ///
    /// Returns nothing if any kind lacks the field or the per-kind infos do
    /// not merge.
    pub fn shared_field_type_info<K: AsRef<str>>(
        &self,
        kinds: &[K],
        field: &str,
    ) -> Option<FieldTypeInfo> {
        self.shared(KindSpace::Node, kinds, field)
    }

    /// Edge-kind variant of [`Introspector::shared_field_type_info`].
    pub fn shared_edge_field_type_info<K: AsRef<str>>(
        &self,
        kinds: &[K],
        field: &str,
    ) -> Option<FieldTypeInfo> {
        self.shared(KindSpace::Edge, kinds, field)
    }

    fn shared<K: AsRef<str>>(
        &self,
        space: KindSpace,
        kinds: &[K],
        field: &str,
    ) -> Option<FieldTypeInfo> {
        let mut merged: Option<FieldTypeInfo> = None;
        for kind in kinds {
            let info = self.lookup(space, kind.as_ref(), field)?;
            merged = Some(match merged {
                None => info,
                Some(previous) => previous.shared(&info)?,
            });
        }
        merged
    }

    fn lookup(&self, space: KindSpace, kind: &str, field: &str) -> Option<FieldTypeInfo> {
        let key = (space, kind.to_owned(), field.to_owned());
        if let Some(cached) = self.cache.lock().get(&key) {
            return cached.clone();
        }
        let schema = match space {
            KindSpace::Node => self.graph.node(kind).and_then(|def| def.props.get(field)),
            KindSpace::Edge => self.graph.edge(kind).and_then(|def| def.props.get(field)),
        };
        let resolved = schema.and_then(resolve);
        self.cache.lock().put(key, resolved.clone());
        resolved
    }
}

/// Walks one property schema down to concrete type info.
fn resolve(schema: &PropType) -> Option<FieldTypeInfo> {
    match schema {
        PropType::String => Some(FieldTypeInfo::scalar(ValueType::String)),
        PropType::Number => Some(FieldTypeInfo::scalar(ValueType::Number)),
        PropType::Boolean => Some(FieldTypeInfo::scalar(ValueType::Boolean)),
        PropType::Date => Some(FieldTypeInfo::scalar(ValueType::Date)),
        PropType::Literal(value) => literal_scalar(value).map(FieldTypeInfo::scalar),
        PropType::Enum(values) => Some(FieldTypeInfo::scalar(enum_scalar(values))),
        PropType::Array(element) => Some(match resolve(element) {
            Some(info) => FieldTypeInfo::array(info),
            None => FieldTypeInfo::array_of_unknown(),
        }),
        PropType::Object(fields) => {
            let shape = fields
                .iter()
                .map(|(name, schema)| {
                    let info =
                        resolve(schema).unwrap_or(FieldTypeInfo::scalar(ValueType::Unknown));
                    (name.clone(), info)
                })
                .collect();
            Some(FieldTypeInfo::object(shape))
        }
        PropType::Record(value) => {
            let info = resolve(value).unwrap_or(FieldTypeInfo::scalar(ValueType::Unknown));
            Some(FieldTypeInfo::record(info))
        }
        PropType::Embedding { dimensions } if *dimensions > 0 => {
            Some(FieldTypeInfo::embedding(*dimensions))
        }
        PropType::Embedding { .. } => None,
        PropType::Optional(inner)
        | PropType::Nullable(inner)
        | PropType::WithDefault(inner, _)
        | PropType::ReadOnly(inner) => resolve(inner),
        PropType::Union(alternatives) => {
            let mut merged: Option<FieldTypeInfo> = None;
            for alternative in alternatives {
                let info = resolve(alternative)?;
                merged = Some(match merged {
                    None => info,
                    Some(previous) => previous.shared(&info)?,
                });
            }
            merged
        }
        PropType::Unknown => Some(FieldTypeInfo::scalar(ValueType::Unknown)),
    }
}

/// Maps a literal value to its scalar kind by runtime inspection.
fn literal_scalar(value: &Value) -> Option<ValueType> {
    match value {
        Value::String(_) => Some(ValueType::String),
        Value::Int(_) | Value::Float(_) => Some(ValueType::Number),
        Value::Bool(_) => Some(ValueType::Boolean),
        Value::Date(_) => Some(ValueType::Date),
        _ => None,
    }
}

/// Enums resolve to string unless every value shares another scalar kind.
fn enum_scalar(values: &[Value]) -> ValueType {
    let mut common: Option<ValueType> = None;
    for value in values {
        let scalar = match literal_scalar(value) {
            Some(scalar) => scalar,
            None => return ValueType::String,
        };
        match common {
            None => common = Some(scalar),
            Some(existing) if existing == scalar => {}
            Some(_) => return ValueType::String,
        }
    }
    common.unwrap_or(ValueType::String)
}
