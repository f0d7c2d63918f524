//! Immutable abstract syntax tree for graph queries.
//!
//! The structures here are the contract between the fluent builder and the
//! dialect compilers. Builders produce a [`QueryAst`] value; compilers only
//! read it. Every collection preserves construction order.

use crate::schema::ValueType;
use crate::value::{Operand, Value};

/// Root node source of a query.
#[derive(Clone, Debug, PartialEq)]
pub struct StartClause {
    /// User-provided alias for the start nodes.
    pub alias: String,
    /// Concrete node kinds matched at the root (subclasses pre-expanded).
    pub kinds: Vec<String>,
    /// Whether `kinds` came from a subclass expansion.
    pub include_sub_classes: bool,
}

/// Direction of an edge traversal relative to the source alias.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Out,
    In,
}

/// Which edge endpoint column joins back to the source alias.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinEdgeField {
    FromId,
    ToId,
}

impl JoinEdgeField {
    /// Physical column name on the edges table.
    pub fn column(self) -> &'static str {
        match self {
            JoinEdgeField::FromId => "from_id",
            JoinEdgeField::ToId => "to_id",
        }
    }

    /// The opposite endpoint column, where the target node attaches.
    pub fn opposite(self) -> JoinEdgeField {
        match self {
            JoinEdgeField::FromId => JoinEdgeField::ToId,
            JoinEdgeField::ToId => JoinEdgeField::FromId,
        }
    }
}

/// Cycle handling for variable-length traversals.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecursiveCyclePolicy {
    /// Visited nodes are tracked; cycles produce no additional rows.
    Prevent,
    /// Cycles may repeat rows, bounded only by the depth limit.
    Allow,
}

/// Variable-length expansion attached to a traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct RecursiveSpec {
    /// Minimum number of hops included in the result (>= 1).
    pub min_depth: u32,
    /// Maximum number of hops; -1 means unlimited (bounded by the engine ceiling).
    pub max_depth: i32,
    pub cycle_policy: RecursiveCyclePolicy,
    /// Result column exposing the node-id path when present.
    pub path_alias: Option<String>,
    /// Result column exposing the hop count when present.
    pub depth_alias: Option<String>,
}

/// One edge hop from a source alias to a target node alias.
#[derive(Clone, Debug, PartialEq)]
pub struct Traversal {
    pub edge_alias: String,
    /// Edge kinds matched in the declared direction.
    pub edge_kinds: Vec<String>,
    /// Edge kinds matched against the reversed join (ontology inverses).
    pub inverse_edge_kinds: Vec<String>,
    pub direction: Direction,
    pub node_alias: String,
    pub node_kinds: Vec<String>,
    /// Alias this traversal joins from (start or an earlier target).
    pub join_from_alias: String,
    /// Edge endpoint column pointing at `join_from_alias`.
    pub join_edge_field: JoinEdgeField,
    /// LEFT-JOIN semantics when true: target columns are NULL on no match.
    pub optional: bool,
    pub variable_length: Option<RecursiveSpec>,
}

/// Whether a predicate targets a node alias or an edge alias.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetType {
    Node,
    Edge,
}

/// A predicate expression attached to one alias.
#[derive(Clone, Debug, PartialEq)]
pub struct NodePredicate {
    pub target_alias: String,
    pub target_type: TargetType,
    pub expression: PredicateExpression,
}

/// System columns addressable by a field reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldPath {
    Id,
    Kind,
    FromId,
    ToId,
    /// A user property inside the JSON blob; `json_pointer` selects within it.
    Props,
}

/// Reference to a field of one alias.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    pub alias: String,
    pub path: FieldPath,
    /// Path segments below `props` (empty for the blob or a system column).
    pub json_pointer: Vec<String>,
    /// Introspected type of the referenced value, when known.
    pub value_type: Option<ValueType>,
    /// Element type for array-typed references, when known.
    pub element_type: Option<ValueType>,
}

impl FieldRef {
    pub fn system(alias: impl Into<String>, path: FieldPath) -> Self {
        Self {
            alias: alias.into(),
            path,
            json_pointer: Vec::new(),
            value_type: None,
            element_type: None,
        }
    }

    pub fn prop(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: FieldPath::Props,
            json_pointer: vec![field.into()],
            value_type: None,
            element_type: None,
        }
    }

    pub fn with_type(mut self, value_type: Option<ValueType>) -> Self {
        self.value_type = value_type;
        self
    }

    /// Stable identifier used for cursor columns: alias plus path segments.
    pub fn column_id(&self) -> String {
        let mut id = self.alias.clone();
        match self.path {
            FieldPath::Props => {
                for segment in &self.json_pointer {
                    id.push('.');
                    id.push_str(segment);
                }
            }
            FieldPath::Id => id.push_str(".id"),
            FieldPath::Kind => id.push_str(".kind"),
            FieldPath::FromId => id.push_str(".from_id"),
            FieldPath::ToId => id.push_str(".to_id"),
        }
        id
    }
}

/// Comparison operators usable on scalar fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

/// Pattern-style string operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StringOpKind {
    Contains,
    StartsWith,
    EndsWith,
    Like,
    ILike,
}

/// Array membership and length operators.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayOpKind {
    Contains(Operand),
    ContainsAll(Vec<Value>),
    ContainsAny(Vec<Value>),
    IsEmpty,
    IsNotEmpty,
    Length(ComparisonOp, u64),
}

/// Nested-object path operators.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectOpKind {
    HasKey(String),
    HasPath(Vec<String>),
    PathEquals(Vec<String>, Value),
    PathContains(Vec<String>, Value),
    PathIsNull(Vec<String>),
    PathIsNotNull(Vec<String>),
}

/// Distance metric for vector similarity predicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VectorMetric {
    Cosine,
    L2,
    InnerProduct,
}

/// Aggregate functions available to projections and HAVING comparisons.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateFunc {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

/// An aggregate over an optional field (bare COUNT has no field).
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    pub field: Option<FieldRef>,
}

/// Predicate expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateExpression {
    Comparison {
        field: FieldRef,
        op: ComparisonOp,
        value: Operand,
    },
    StringOp {
        field: FieldRef,
        op: StringOpKind,
        value: Operand,
    },
    Between {
        field: FieldRef,
        low: Operand,
        high: Operand,
    },
    NullCheck {
        field: FieldRef,
        negated: bool,
    },
    ArrayOp {
        field: FieldRef,
        op: ArrayOpKind,
    },
    ObjectOp {
        field: FieldRef,
        op: ObjectOpKind,
    },
    AggregateComparison {
        aggregate: AggregateExpr,
        op: ComparisonOp,
        value: Operand,
    },
    VectorSimilarity {
        field: FieldRef,
        query: Vec<f32>,
        k: u64,
        metric: VectorMetric,
        min_score: Option<f64>,
    },
    And(Vec<PredicateExpression>),
    Or(Vec<PredicateExpression>),
    Not(Box<PredicateExpression>),
    Exists {
        subquery: Box<QueryAst>,
        negated: bool,
    },
    InSubquery {
        field: FieldRef,
        subquery: Box<QueryAst>,
        negated: bool,
    },
}

impl PredicateExpression {
    /// Visits every operand in the tree, including subquery predicates.
    pub fn visit_operands<'a>(&'a self, visit: &mut dyn FnMut(&'a Operand)) {
        match self {
            PredicateExpression::Comparison { value, .. }
            | PredicateExpression::StringOp { value, .. } => visit(value),
            PredicateExpression::Between { low, high, .. } => {
                visit(low);
                visit(high);
            }
            PredicateExpression::ArrayOp { op, .. } => {
                if let ArrayOpKind::Contains(operand) = op {
                    visit(operand);
                }
            }
            PredicateExpression::AggregateComparison { value, .. } => visit(value),
            PredicateExpression::And(children) | PredicateExpression::Or(children) => {
                for child in children {
                    child.visit_operands(visit);
                }
            }
            PredicateExpression::Not(child) => child.visit_operands(visit),
            PredicateExpression::Exists { subquery, .. } => {
                for predicate in &subquery.predicates {
                    predicate.expression.visit_operands(visit);
                }
            }
            PredicateExpression::InSubquery { subquery, .. } => {
                for predicate in &subquery.predicates {
                    predicate.expression.visit_operands(visit);
                }
            }
            PredicateExpression::NullCheck { .. }
            | PredicateExpression::ObjectOp { .. }
            | PredicateExpression::VectorSimilarity { .. } => {}
        }
    }

    /// Rewrites parameter operands in place via `substitute`.
    pub fn substitute_params(
        &mut self,
        substitute: &dyn Fn(&str) -> Option<Value>,
    ) {
        let replace = |operand: &mut Operand| {
            if let Operand::Param(name) = operand {
                if let Some(value) = substitute(name) {
                    *operand = Operand::Literal(value);
                }
            }
        };
        match self {
            PredicateExpression::Comparison { value, .. }
            | PredicateExpression::StringOp { value, .. } => replace(value),
            PredicateExpression::Between { low, high, .. } => {
                replace(low);
                replace(high);
            }
            PredicateExpression::ArrayOp { op, .. } => {
                if let ArrayOpKind::Contains(operand) = op {
                    replace(operand);
                }
            }
            PredicateExpression::AggregateComparison { value, .. } => replace(value),
            PredicateExpression::And(children) | PredicateExpression::Or(children) => {
                for child in children {
                    child.substitute_params(substitute);
                }
            }
            PredicateExpression::Not(child) => child.substitute_params(substitute),
            PredicateExpression::Exists { subquery, .. }
            | PredicateExpression::InSubquery { subquery, .. } => {
                for predicate in &mut subquery.predicates {
                    predicate.expression.substitute_params(substitute);
                }
            }
            PredicateExpression::NullCheck { .. }
            | PredicateExpression::ObjectOp { .. }
            | PredicateExpression::VectorSimilarity { .. } => {}
        }
    }
}

/// Temporal visibility of rows.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum TemporalMode {
    /// Only live, non-deleted versions.
    #[default]
    Current,
    /// Every version, including deleted ones.
    All,
    /// Versions valid at the given ISO-8601 instant.
    AsOf(String),
}

/// Sort direction for an ORDER BY entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> SortDirection {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// One ORDER BY entry.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderSpec {
    pub field: FieldRef,
    pub direction: SortDirection,
}

/// Where a projected column reads from.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionSource {
    /// A physical column of the alias's entity row (id, kind, props, meta).
    Column { alias: String, column: String },
    /// A value extracted through a field reference.
    Field(FieldRef),
}

/// One projected output column of the compiled statement.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedField {
    pub output_name: String,
    pub source: ProjectionSource,
    /// CTE carrying the source columns when they live off-alias (edge
    /// columns ride the CTE of the traversal's target node).
    pub cte_alias: Option<String>,
}

/// One field the selective-projection plan must materialize.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct SelectiveField {
    pub alias: String,
    /// `id`, `kind`, `from_id`, `to_id`, `meta.*`, or a property name.
    pub field: String,
    pub output_name: String,
    pub is_system_field: bool,
    pub value_type: Option<ValueTypeTag>,
}

/// Ord-able wrapper so selective plans sort stably.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ValueTypeTag(pub ValueType);

/// Grouping key list plus HAVING filter.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Grouping {
    pub keys: Vec<FieldRef>,
    pub having: Option<PredicateExpression>,
}

/// One output column of an aggregate query.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateProjection {
    pub output_name: String,
    pub expr: AggregateProjectionExpr,
}

/// Either a grouped field or an aggregate over the group.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateProjectionExpr {
    Field(FieldRef),
    Aggregate(AggregateExpr),
}

/// Complete, immutable description of one graph query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryAst {
    /// Graph definition this query runs against.
    pub graph_id: String,
    pub start: StartClause,
    pub traversals: Vec<Traversal>,
    pub predicates: Vec<NodePredicate>,
    pub projection: Vec<ProjectedField>,
    pub temporal_mode: TemporalMode,
    pub order_by: Vec<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub grouping: Grouping,
    /// Aggregate output map; non-empty only for aggregate queries.
    pub aggregate_projection: Vec<AggregateProjection>,
    /// When present, the compiler projects only these columns instead of
    /// full node/edge blobs.
    pub selective_fields: Option<Vec<SelectiveField>>,
}

impl QueryAst {
    /// Collects the distinct parameter names referenced anywhere in the AST.
    pub fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut visit = |operand: &Operand| {
            if let Operand::Param(name) = operand {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        };
        for predicate in &self.predicates {
            predicate.expression.visit_operands(&mut visit);
        }
        if let Some(having) = &self.grouping.having {
            having.visit_operands(&mut visit);
        }
        names
    }

    /// True when any predicate references a named parameter.
    pub fn has_params(&self) -> bool {
        !self.param_names().is_empty()
    }

    /// Parameter names used as the pattern side of a string operation.
    pub fn string_op_param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for predicate in &self.predicates {
            collect_string_op_params(&predicate.expression, &mut names);
        }
        names
    }

    /// All aliases defined by the query, in declaration order.
    pub fn aliases(&self) -> Vec<(&str, TargetType)> {
        let mut out = vec![(self.start.alias.as_str(), TargetType::Node)];
        for traversal in &self.traversals {
            out.push((traversal.edge_alias.as_str(), TargetType::Edge));
            out.push((traversal.node_alias.as_str(), TargetType::Node));
        }
        out
    }

    /// The traversal that introduced `alias` (as edge or target node).
    pub fn traversal_for_alias(&self, alias: &str) -> Option<&Traversal> {
        self.traversals
            .iter()
            .find(|t| t.edge_alias == alias || t.node_alias == alias)
    }
}

fn collect_string_op_params(expression: &PredicateExpression, names: &mut Vec<String>) {
    match expression {
        PredicateExpression::StringOp { value, .. } => {
            if let Operand::Param(name) = value {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        PredicateExpression::And(children) | PredicateExpression::Or(children) => {
            for child in children {
                collect_string_op_params(child, names);
            }
        }
        PredicateExpression::Not(child) => collect_string_op_params(child, names),
        _ => {}
    }
}
