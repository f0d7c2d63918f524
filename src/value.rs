//! Canonical runtime value representation shared between the predicate DSL,
//! result mapping, and parameter binding.

use std::collections::BTreeMap;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::schema::ValueType;

/// Typed value flowing through query construction and result rows.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// Null literal.
    #[default]
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Point in time, bound as an RFC 3339 string.
    Date(OffsetDateTime),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// String-keyed mapping of values.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Builds an object value from key/value pairs.
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds an array value.
    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Parses an RFC 3339 string into a date value.
    pub fn date(iso: &str) -> Option<Self> {
        OffsetDateTime::parse(iso, &Rfc3339).ok().map(Value::Date)
    }

    /// The introspected type tag this value maps to.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Unknown,
            Value::Bool(_) => ValueType::Boolean,
            Value::Int(_) | Value::Float(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Reads a key out of an object value, treating missing keys as null.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(fields) => fields.get(key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Converts to the JSON representation used by the physical layout.
    ///
    /// Dates flatten to their RFC 3339 string form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Date(v) => v
                .format(&Rfc3339)
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Converts back from JSON. Strings stay strings; callers with type info
    /// use [`Value::from_json_typed`] to recover dates.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(*v),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(v) => Value::String(v.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts from JSON, reviving date strings when the declared type says so.
    pub fn from_json_typed(json: &serde_json::Value, value_type: Option<ValueType>) -> Value {
        if value_type == Some(ValueType::Date) {
            if let serde_json::Value::String(s) = json {
                if let Some(date) = Value::date(s) {
                    return date;
                }
            }
        }
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::Date(value)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Right-hand side of a predicate: a literal now, or a named parameter bound
/// at prepared-execution time.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Literal(Value),
    Param(String),
}

impl Operand {
    pub fn is_param(&self) -> bool {
        matches!(self, Operand::Param(_))
    }

    pub fn param_name(&self) -> Option<&str> {
        match self {
            Operand::Param(name) => Some(name),
            Operand::Literal(_) => None,
        }
    }
}

impl<V: Into<Value>> From<V> for Operand {
    fn from(value: V) -> Self {
        Operand::Literal(value.into())
    }
}

/// References a named parameter to be supplied via `prepare().execute(..)`.
pub fn param(name: impl Into<String>) -> Operand {
    Operand::Param(name.into())
}
