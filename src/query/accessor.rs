//! Typed field-accessor DSL.
//!
//! `where_node`/`where_edge` callbacks receive a [`FieldSource`] bound to one
//! alias. `source.field("age")` resolves the shared type info for the
//! alias's kinds and returns a [`FieldAccessor`] whose operations emit
//! [`Predicate`] values. Type mismatches latch an error inside the predicate
//! and surface when the builder attaches it, so callback code stays fluent.

use crate::error::{Error, Result};
use crate::query::ast::{
    ArrayOpKind, ComparisonOp, FieldPath, FieldRef, ObjectOpKind, PredicateExpression,
    StringOpKind, TargetType, VectorMetric,
};
use crate::schema::{FieldTypeInfo, Introspector, ValueType};
use crate::value::{Operand, Value};

/// Predicate produced by accessor operations; may carry a latched error.
#[derive(Debug)]
pub struct Predicate {
    pub(crate) expression: Result<PredicateExpression>,
}

impl Predicate {
    fn ok(expression: PredicateExpression) -> Self {
        Self {
            expression: Ok(expression),
        }
    }

    fn err(error: Error) -> Self {
        Self {
            expression: Err(error),
        }
    }

    pub(crate) fn into_expression(self) -> Result<PredicateExpression> {
        self.expression
    }

    /// Conjunction with another predicate.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self.expression, other.expression) {
            (Ok(left), Ok(right)) => {
                let mut children = match left {
                    PredicateExpression::And(children) => children,
                    other => vec![other],
                };
                children.push(right);
                Predicate::ok(PredicateExpression::And(children))
            }
            (Err(error), _) | (_, Err(error)) => Predicate::err(error),
        }
    }

    /// Disjunction with another predicate.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self.expression, other.expression) {
            (Ok(left), Ok(right)) => {
                let mut children = match left {
                    PredicateExpression::Or(children) => children,
                    other => vec![other],
                };
                children.push(right);
                Predicate::ok(PredicateExpression::Or(children))
            }
            (Err(error), _) | (_, Err(error)) => Predicate::err(error),
        }
    }
}

/// Negates a predicate.
pub fn not(predicate: Predicate) -> Predicate {
    match predicate.expression {
        Ok(expression) => Predicate::ok(PredicateExpression::Not(Box::new(expression))),
        Err(error) => Predicate::err(error),
    }
}

/// Wraps a finished sub-query in an EXISTS predicate.
pub fn exists(subquery: crate::query::ast::QueryAst) -> Predicate {
    Predicate::ok(PredicateExpression::Exists {
        subquery: Box::new(subquery),
        negated: false,
    })
}

/// Wraps a finished sub-query in a NOT EXISTS predicate.
pub fn not_exists(subquery: crate::query::ast::QueryAst) -> Predicate {
    Predicate::ok(PredicateExpression::Exists {
        subquery: Box::new(subquery),
        negated: true,
    })
}

/// Options for vector similarity search.
#[derive(Clone, Debug)]
pub struct SimilarOptions {
    pub metric: VectorMetric,
    pub min_score: Option<f64>,
}

impl Default for SimilarOptions {
    fn default() -> Self {
        Self {
            metric: VectorMetric::Cosine,
            min_score: None,
        }
    }
}

/// Field lookup surface bound to one alias inside a predicate callback.
pub struct FieldSource<'a> {
    alias: String,
    target_type: TargetType,
    kinds: Vec<String>,
    introspector: &'a Introspector,
}

impl<'a> FieldSource<'a> {
    pub(crate) fn new(
        alias: impl Into<String>,
        target_type: TargetType,
        kinds: Vec<String>,
        introspector: &'a Introspector,
    ) -> Self {
        Self {
            alias: alias.into(),
            target_type,
            kinds,
            introspector,
        }
    }

    /// Accessor for a user property field.
    pub fn field(&self, name: &str) -> FieldAccessor {
        let info = match self.target_type {
            TargetType::Node => self
                .introspector
                .shared_field_type_info(&self.kinds, name),
            TargetType::Edge => self
                .introspector
                .shared_edge_field_type_info(&self.kinds, name),
        };
        let field = FieldRef::prop(self.alias.clone(), name)
            .with_type(info.as_ref().map(|i| i.value_type));
        FieldAccessor {
            field: FieldRef {
                element_type: info.as_ref().and_then(|i| i.element_type),
                ..field
            },
            info,
        }
    }

    /// Accessor for the entity id column.
    pub fn id(&self) -> FieldAccessor {
        FieldAccessor {
            field: FieldRef::system(self.alias.clone(), FieldPath::Id)
                .with_type(Some(ValueType::String)),
            info: Some(FieldTypeInfo::scalar(ValueType::String)),
        }
    }

    /// Accessor for the kind discriminator column.
    pub fn kind(&self) -> FieldAccessor {
        FieldAccessor {
            field: FieldRef::system(self.alias.clone(), FieldPath::Kind)
                .with_type(Some(ValueType::String)),
            info: Some(FieldTypeInfo::scalar(ValueType::String)),
        }
    }
}

/// Accessor over one field reference; operations emit predicates.
#[derive(Clone, Debug)]
pub struct FieldAccessor {
    field: FieldRef,
    info: Option<FieldTypeInfo>,
}

impl FieldAccessor {
    fn value_type(&self) -> Option<ValueType> {
        self.info.as_ref().map(|i| i.value_type)
    }

    fn type_error(&self, operation: &str) -> Predicate {
        Predicate::err(Error::validation_at(
            format!(
                "operation '{operation}' is not defined for {:?} field '{}'",
                self.value_type().unwrap_or(ValueType::Unknown),
                self.field.column_id()
            ),
            self.field.column_id(),
        ))
    }

    fn require(&self, operation: &str, allowed: &[ValueType]) -> Option<Predicate> {
        match self.value_type() {
            Some(actual) if actual != ValueType::Unknown && !allowed.contains(&actual) => {
                Some(self.type_error(operation))
            }
            _ => None,
        }
    }

    fn comparison(&self, op: ComparisonOp, value: Operand) -> Predicate {
        Predicate::ok(PredicateExpression::Comparison {
            field: self.field.clone(),
            op,
            value,
        })
    }

    /// Equality against a literal or parameter.
    pub fn eq(&self, value: impl Into<Operand>) -> Predicate {
        self.comparison(ComparisonOp::Eq, value.into())
    }

    /// Inequality against a literal or parameter.
    pub fn neq(&self, value: impl Into<Operand>) -> Predicate {
        self.comparison(ComparisonOp::Neq, value.into())
    }

    pub fn gt(&self, value: impl Into<Operand>) -> Predicate {
        self.ordered(ComparisonOp::Gt, value.into(), "gt")
    }

    pub fn gte(&self, value: impl Into<Operand>) -> Predicate {
        self.ordered(ComparisonOp::Gte, value.into(), "gte")
    }

    pub fn lt(&self, value: impl Into<Operand>) -> Predicate {
        self.ordered(ComparisonOp::Lt, value.into(), "lt")
    }

    pub fn lte(&self, value: impl Into<Operand>) -> Predicate {
        self.ordered(ComparisonOp::Lte, value.into(), "lte")
    }

    fn ordered(&self, op: ComparisonOp, value: Operand, name: &str) -> Predicate {
        const ORDERED: &[ValueType] = &[ValueType::Number, ValueType::Date, ValueType::String];
        if let Some(error) = self.require(name, ORDERED) {
            return error;
        }
        self.comparison(op, value)
    }

    /// Inclusive range check.
    pub fn between(&self, low: impl Into<Operand>, high: impl Into<Operand>) -> Predicate {
        const ORDERED: &[ValueType] = &[ValueType::Number, ValueType::Date, ValueType::String];
        if let Some(error) = self.require("between", ORDERED) {
            return error;
        }
        Predicate::ok(PredicateExpression::Between {
            field: self.field.clone(),
            low: low.into(),
            high: high.into(),
        })
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::ok(PredicateExpression::NullCheck {
            field: self.field.clone(),
            negated: false,
        })
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::ok(PredicateExpression::NullCheck {
            field: self.field.clone(),
            negated: true,
        })
    }

    /// Membership in a finite literal set.
    pub fn in_list<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Predicate {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Predicate::err(Error::validation("in() requires at least one value"));
        }
        self.comparison(ComparisonOp::In, Operand::Literal(Value::Array(values)))
    }

    /// Exclusion from a finite literal set.
    pub fn not_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Predicate {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Predicate::err(Error::validation("notIn() requires at least one value"));
        }
        self.comparison(ComparisonOp::NotIn, Operand::Literal(Value::Array(values)))
    }

    /// Substring match on strings, element membership on arrays.
    pub fn contains(&self, value: impl Into<Operand>) -> Predicate {
        match self.value_type() {
            Some(ValueType::Array) => Predicate::ok(PredicateExpression::ArrayOp {
                field: self.field.clone(),
                op: ArrayOpKind::Contains(value.into()),
            }),
            Some(ValueType::String) | Some(ValueType::Unknown) | None => self.string_op(
                StringOpKind::Contains,
                value.into(),
            ),
            _ => self.type_error("contains"),
        }
    }

    pub fn starts_with(&self, value: impl Into<Operand>) -> Predicate {
        self.string_only(StringOpKind::StartsWith, value.into(), "startsWith")
    }

    pub fn ends_with(&self, value: impl Into<Operand>) -> Predicate {
        self.string_only(StringOpKind::EndsWith, value.into(), "endsWith")
    }

    /// Raw LIKE pattern.
    pub fn like(&self, pattern: impl Into<Operand>) -> Predicate {
        self.string_only(StringOpKind::Like, pattern.into(), "like")
    }

    /// Case-insensitive LIKE pattern.
    pub fn ilike(&self, pattern: impl Into<Operand>) -> Predicate {
        self.string_only(StringOpKind::ILike, pattern.into(), "ilike")
    }

    fn string_only(&self, op: StringOpKind, value: Operand, name: &str) -> Predicate {
        if let Some(error) = self.require(name, &[ValueType::String]) {
            return error;
        }
        self.string_op(op, value)
    }

    fn string_op(&self, op: StringOpKind, value: Operand) -> Predicate {
        Predicate::ok(PredicateExpression::StringOp {
            field: self.field.clone(),
            op,
            value,
        })
    }

    /// Array contains every listed element.
    pub fn contains_all<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Predicate {
        if let Some(error) = self.require("containsAll", &[ValueType::Array]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ArrayOp {
            field: self.field.clone(),
            op: ArrayOpKind::ContainsAll(values.into_iter().map(Into::into).collect()),
        })
    }

    /// Array contains at least one listed element.
    pub fn contains_any<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Predicate {
        if let Some(error) = self.require("containsAny", &[ValueType::Array]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ArrayOp {
            field: self.field.clone(),
            op: ArrayOpKind::ContainsAny(values.into_iter().map(Into::into).collect()),
        })
    }

    pub fn is_empty(&self) -> Predicate {
        if let Some(error) = self.require("isEmpty", &[ValueType::Array]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ArrayOp {
            field: self.field.clone(),
            op: ArrayOpKind::IsEmpty,
        })
    }

    pub fn is_not_empty(&self) -> Predicate {
        if let Some(error) = self.require("isNotEmpty", &[ValueType::Array]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ArrayOp {
            field: self.field.clone(),
            op: ArrayOpKind::IsNotEmpty,
        })
    }

    pub fn length_eq(&self, length: u64) -> Predicate {
        self.length_op(ComparisonOp::Eq, length)
    }

    pub fn length_gt(&self, length: u64) -> Predicate {
        self.length_op(ComparisonOp::Gt, length)
    }

    pub fn length_gte(&self, length: u64) -> Predicate {
        self.length_op(ComparisonOp::Gte, length)
    }

    pub fn length_lt(&self, length: u64) -> Predicate {
        self.length_op(ComparisonOp::Lt, length)
    }

    pub fn length_lte(&self, length: u64) -> Predicate {
        self.length_op(ComparisonOp::Lte, length)
    }

    fn length_op(&self, op: ComparisonOp, length: u64) -> Predicate {
        if let Some(error) = self.require("length", &[ValueType::Array]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ArrayOp {
            field: self.field.clone(),
            op: ArrayOpKind::Length(op, length),
        })
    }

    /// Descends one key into an object field, returning the nested accessor.
    pub fn get(&self, key: &str) -> FieldAccessor {
        let nested_info = self
            .info
            .as_ref()
            .and_then(|info| info.descend(key))
            .cloned();
        let mut field = self.field.clone();
        field.json_pointer.push(key.to_owned());
        field.value_type = nested_info.as_ref().map(|i| i.value_type);
        field.element_type = nested_info.as_ref().and_then(|i| i.element_type);
        FieldAccessor {
            field,
            info: nested_info,
        }
    }

    /// Object has the given top-level key.
    pub fn has_key(&self, key: impl Into<String>) -> Predicate {
        if let Some(error) = self.require("hasKey", &[ValueType::Object]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ObjectOp {
            field: self.field.clone(),
            op: ObjectOpKind::HasKey(key.into()),
        })
    }

    /// Object has a value at the given path.
    pub fn has_path<S: Into<String>>(&self, path: impl IntoIterator<Item = S>) -> Predicate {
        if let Some(error) = self.require("hasPath", &[ValueType::Object]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ObjectOp {
            field: self.field.clone(),
            op: ObjectOpKind::HasPath(path.into_iter().map(Into::into).collect()),
        })
    }

    /// Scalar equality at a nested path. Array and object targets are
    /// rejected; this operation is scalar-only.
    pub fn path_equals<S: Into<String>>(
        &self,
        path: impl IntoIterator<Item = S>,
        value: impl Into<Value>,
    ) -> Predicate {
        if let Some(error) = self.require("pathEquals", &[ValueType::Object]) {
            return error;
        }
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        let value = value.into();
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Predicate::err(Error::validation_at(
                "pathEquals compares scalars only",
                self.field.column_id(),
            ));
        }
        if let Some(target) = self.path_target_info(&path) {
            if matches!(target.value_type, ValueType::Array | ValueType::Object) {
                return Predicate::err(Error::validation_at(
                    "pathEquals target resolves to a non-scalar value",
                    self.field.column_id(),
                ));
            }
        }
        Predicate::ok(PredicateExpression::ObjectOp {
            field: self.field.clone(),
            op: ObjectOpKind::PathEquals(path, value),
        })
    }

    /// Array membership at a nested path; the path must resolve to an array.
    pub fn path_contains<S: Into<String>>(
        &self,
        path: impl IntoIterator<Item = S>,
        value: impl Into<Value>,
    ) -> Predicate {
        if let Some(error) = self.require("pathContains", &[ValueType::Object]) {
            return error;
        }
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if let Some(target) = self.path_target_info(&path) {
            if !matches!(target.value_type, ValueType::Array | ValueType::Unknown) {
                return Predicate::err(Error::validation_at(
                    "pathContains requires an array target",
                    self.field.column_id(),
                ));
            }
        }
        Predicate::ok(PredicateExpression::ObjectOp {
            field: self.field.clone(),
            op: ObjectOpKind::PathContains(path, value.into()),
        })
    }

    pub fn path_is_null<S: Into<String>>(&self, path: impl IntoIterator<Item = S>) -> Predicate {
        if let Some(error) = self.require("pathIsNull", &[ValueType::Object]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ObjectOp {
            field: self.field.clone(),
            op: ObjectOpKind::PathIsNull(path.into_iter().map(Into::into).collect()),
        })
    }

    pub fn path_is_not_null<S: Into<String>>(
        &self,
        path: impl IntoIterator<Item = S>,
    ) -> Predicate {
        if let Some(error) = self.require("pathIsNotNull", &[ValueType::Object]) {
            return error;
        }
        Predicate::ok(PredicateExpression::ObjectOp {
            field: self.field.clone(),
            op: ObjectOpKind::PathIsNotNull(path.into_iter().map(Into::into).collect()),
        })
    }

    /// Membership in the id set produced by a finished sub-query.
    ///
    /// The sub-query contributes its start alias's id column.
    pub fn in_subquery(&self, subquery: crate::query::ast::QueryAst) -> Predicate {
        Predicate::ok(PredicateExpression::InSubquery {
            field: self.field.clone(),
            subquery: Box::new(subquery),
            negated: false,
        })
    }

    /// Exclusion from the id set produced by a finished sub-query.
    pub fn not_in_subquery(&self, subquery: crate::query::ast::QueryAst) -> Predicate {
        Predicate::ok(PredicateExpression::InSubquery {
            field: self.field.clone(),
            subquery: Box::new(subquery),
            negated: true,
        })
    }

    /// K-nearest-neighbor similarity predicate on an embedding field.
    ///
    /// Placement (top level or AND chain only) is checked when the AST is
    /// materialized.
    pub fn similar_to(
        &self,
        vector: impl IntoIterator<Item = f32>,
        k: u64,
        options: SimilarOptions,
    ) -> Predicate {
        if let Some(error) = self.require("similarTo", &[ValueType::Embedding]) {
            return error;
        }
        let query: Vec<f32> = vector.into_iter().collect();
        if let Some(dimensions) = self.info.as_ref().and_then(|i| i.dimensions) {
            if query.len() != dimensions {
                return Predicate::err(Error::validation_at(
                    format!(
                        "query vector has {} dimensions, field declares {dimensions}",
                        query.len()
                    ),
                    self.field.column_id(),
                ));
            }
        }
        if k == 0 {
            return Predicate::err(Error::validation("similarTo requires k >= 1"));
        }
        Predicate::ok(PredicateExpression::VectorSimilarity {
            field: self.field.clone(),
            query,
            k,
            metric: options.metric,
            min_score: options.min_score,
        })
    }

    fn path_target_info(&self, path: &[String]) -> Option<FieldTypeInfo> {
        let mut current = self.info.clone()?;
        for segment in path {
            current = current.descend(segment)?.clone();
        }
        Some(current)
    }
}
