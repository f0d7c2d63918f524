//! Introspected field type metadata.
//!
//! A [`FieldTypeInfo`] describes one property field of a node or edge kind:
//! its scalar kind, the element type for arrays, the nested shape for
//! objects, and the dimensionality for embeddings. Infos for several kinds
//! sharing a field intersect via [`FieldTypeInfo::shared`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar or compound kind of a property field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    Embedding,
    Unknown,
}

/// Resolved type information for one property field.
///
/// Invariants: `dimensions` is present iff the type is an embedding,
/// `element_type`/`element_type_info` iff the type is an array, and
/// `shape`/`record_value_type` iff the type is an object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldTypeInfo {
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<ValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type_info: Option<Box<FieldTypeInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<BTreeMap<String, FieldTypeInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_value_type: Option<Box<FieldTypeInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl FieldTypeInfo {
    /// A plain scalar (or unknown) info.
    pub fn scalar(value_type: ValueType) -> Self {
        Self {
            value_type,
            element_type: None,
            element_type_info: None,
            shape: None,
            record_value_type: None,
            dimensions: None,
        }
    }

    /// An array info carrying its element description.
    pub fn array(element: FieldTypeInfo) -> Self {
        Self {
            value_type: ValueType::Array,
            element_type: Some(element.value_type),
            element_type_info: Some(Box::new(element)),
            ..Self::scalar(ValueType::Array)
        }
    }

    /// An array whose element type could not be resolved.
    pub fn array_of_unknown() -> Self {
        Self {
            value_type: ValueType::Array,
            element_type: Some(ValueType::Unknown),
            element_type_info: None,
            ..Self::scalar(ValueType::Array)
        }
    }

    /// An object info with a fixed field shape.
    pub fn object(shape: BTreeMap<String, FieldTypeInfo>) -> Self {
        Self {
            value_type: ValueType::Object,
            shape: Some(shape),
            ..Self::scalar(ValueType::Object)
        }
    }

    /// A dictionary-like object whose values share one type.
    pub fn record(value: FieldTypeInfo) -> Self {
        Self {
            value_type: ValueType::Object,
            record_value_type: Some(Box::new(value)),
            ..Self::scalar(ValueType::Object)
        }
    }

    /// An embedding info with a positive dimensionality.
    pub fn embedding(dimensions: usize) -> Self {
        Self {
            value_type: ValueType::Embedding,
            dimensions: Some(dimensions),
            ..Self::scalar(ValueType::Embedding)
        }
    }

    /// Resolves the info shared by two kinds declaring the same field.
    ///
    /// Mismatched top-level types yield no shared info. Arrays merge by
    /// common element type, defaulting to unknown. Objects intersect their
    /// shape keys and recursively merge the survivors; keys whose merge
    /// yields nothing are dropped.
    pub fn shared(&self, other: &FieldTypeInfo) -> Option<FieldTypeInfo> {
        if self.value_type != other.value_type {
            return None;
        }
        match self.value_type {
            ValueType::Array => {
                let element_type = match (self.element_type, other.element_type) {
                    (Some(a), Some(b)) if a == b => Some(a),
                    _ => Some(ValueType::Unknown),
                };
                let element_type_info = match (&self.element_type_info, &other.element_type_info) {
                    (Some(a), Some(b)) => a.shared(b).map(Box::new),
                    _ => None,
                };
                Some(FieldTypeInfo {
                    element_type,
                    element_type_info,
                    ..FieldTypeInfo::scalar(ValueType::Array)
                })
            }
            ValueType::Object => {
                let shape = match (&self.shape, &other.shape) {
                    (Some(a), Some(b)) => {
                        let merged: BTreeMap<String, FieldTypeInfo> = a
                            .iter()
                            .filter_map(|(key, info)| {
                                b.get(key)
                                    .and_then(|other_info| info.shared(other_info))
                                    .map(|shared| (key.clone(), shared))
                            })
                            .collect();
                        Some(merged)
                    }
                    _ => None,
                };
                let record_value_type =
                    match (&self.record_value_type, &other.record_value_type) {
                        (Some(a), Some(b)) => a.shared(b).map(Box::new),
                        _ => None,
                    };
                if shape.is_none() && record_value_type.is_none() {
                    return Some(FieldTypeInfo::scalar(ValueType::Object));
                }
                Some(FieldTypeInfo {
                    shape,
                    record_value_type,
                    ..FieldTypeInfo::scalar(ValueType::Object)
                })
            }
            ValueType::Embedding => {
                if self.dimensions == other.dimensions {
                    Some(self.clone())
                } else {
                    None
                }
            }
            _ => Some(FieldTypeInfo::scalar(self.value_type)),
        }
    }

    /// Looks up the info for a dotted path below an object field.
    pub fn descend(&self, key: &str) -> Option<&FieldTypeInfo> {
        if let Some(shape) = &self.shape {
            if let Some(info) = shape.get(key) {
                return Some(info);
            }
        }
        self.record_value_type.as_deref()
    }
}
