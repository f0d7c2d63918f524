//! Fluent query construction.
//!
//! Every step consumes the builder and returns an extended copy; the first
//! validation failure is latched and surfaced by the terminal call
//! (`select`, `aggregate`, `to_ast`). Aliases accumulate in a map checked
//! for uniqueness and grammar at each step, so a finished AST never carries
//! an invalid or duplicate alias.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::exec::aggregate::ExecutableAggregateQuery;
use crate::exec::context::SelectContext;
use crate::exec::executable::ExecutableQuery;
use crate::query::accessor::{FieldSource, Predicate};
use crate::query::ast::{
    AggregateExpr, AggregateFunc, AggregateProjection, AggregateProjectionExpr, Direction,
    FieldRef, Grouping, JoinEdgeField, NodePredicate, OrderSpec, ProjectedField, ProjectionSource,
    QueryAst, RecursiveCyclePolicy, RecursiveSpec, SortDirection, StartClause, TargetType,
    TemporalMode, Traversal,
};
use crate::query::validate::{check_alias, check_recursive_spec, check_vector_placement};
use crate::value::{Operand, Value};

/// Columns projected for every node alias on the full-blob path.
pub const NODE_BLOB_COLUMNS: &[&str] = &[
    "id",
    "kind",
    "props",
    "version",
    "valid_from",
    "valid_to",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Columns projected for every edge alias on the full-blob path.
pub const EDGE_BLOB_COLUMNS: &[&str] = &[
    "id",
    "kind",
    "props",
    "from_id",
    "to_id",
    "valid_from",
    "valid_to",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Ontology-driven expansion applied to a traversal's edge kind.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EdgeExpand {
    #[default]
    None,
    /// Add narrower edges implied by the kind.
    Implying,
    /// Add inverse edges, traversed against the join direction.
    Inverse,
    /// Implying and inverse combined.
    All,
}

/// Options for the root `from` clause.
#[derive(Clone, Copy, Debug, Default)]
pub struct FromOptions {
    pub include_sub_classes: bool,
}

/// Options for a traversal step.
#[derive(Clone, Debug, Default)]
pub struct TraverseOptions {
    pub direction: Option<Direction>,
    pub expand: EdgeExpand,
    /// Source alias; defaults to the current alias.
    pub from: Option<String>,
}

/// Options for a traversal target.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToOptions {
    pub include_sub_classes: bool,
}

/// Variable-length expansion request attached to a pending traversal.
#[derive(Clone, Debug)]
pub struct Recursion {
    min_hops: u32,
    max_hops: i32,
    cycle_policy: RecursiveCyclePolicy,
    path_alias: Option<String>,
    depth_alias: Option<String>,
    want_path: bool,
    want_depth: bool,
}

impl Default for Recursion {
    fn default() -> Self {
        Self::new()
    }
}

impl Recursion {
    pub fn new() -> Self {
        Self {
            min_hops: 1,
            max_hops: -1,
            cycle_policy: RecursiveCyclePolicy::Prevent,
            path_alias: None,
            depth_alias: None,
            want_path: false,
            want_depth: false,
        }
    }

    pub fn min_hops(mut self, hops: u32) -> Self {
        self.min_hops = hops;
        self
    }

    pub fn max_hops(mut self, hops: u32) -> Self {
        self.max_hops = hops as i32;
        self
    }

    /// No explicit hop limit; the engine ceiling still applies.
    pub fn unlimited(mut self) -> Self {
        self.max_hops = -1;
        self
    }

    pub fn allow_cycles(mut self) -> Self {
        self.cycle_policy = RecursiveCyclePolicy::Allow;
        self
    }

    /// Expose the hop count as `<target>_depth`.
    pub fn with_depth(mut self) -> Self {
        self.want_depth = true;
        self
    }

    /// Expose the node-id path as `<target>_path`.
    pub fn with_path(mut self) -> Self {
        self.want_path = true;
        self
    }

    pub fn depth_as(mut self, alias: impl Into<String>) -> Self {
        self.want_depth = true;
        self.depth_alias = Some(alias.into());
        self
    }

    pub fn path_as(mut self, alias: impl Into<String>) -> Self {
        self.want_path = true;
        self.path_alias = Some(alias.into());
        self
    }

    fn into_spec(self, node_alias: &str) -> RecursiveSpec {
        let depth_alias = match (self.want_depth, self.depth_alias) {
            (true, Some(alias)) => Some(alias),
            (true, None) => Some(format!("{node_alias}_depth")),
            (false, _) => None,
        };
        let path_alias = match (self.want_path, self.path_alias) {
            (true, Some(alias)) => Some(alias),
            (true, None) => Some(format!("{node_alias}_path")),
            (false, _) => None,
        };
        RecursiveSpec {
            min_depth: self.min_hops,
            max_depth: self.max_hops,
            cycle_policy: self.cycle_policy,
            path_alias,
            depth_alias,
        }
    }
}

#[derive(Clone, Debug)]
struct AliasEntry {
    target_type: TargetType,
    kinds: Vec<String>,
    optional: bool,
}

#[derive(Clone, Debug)]
struct PendingTraversal {
    edge_alias: String,
    edge_kinds: Vec<String>,
    inverse_edge_kinds: Vec<String>,
    direction: Direction,
    join_from_alias: String,
    optional: bool,
    recursion: Option<Recursion>,
}

/// Fluent builder for graph queries.
pub struct QueryBuilder {
    core: Arc<EngineCore>,
    aliases: BTreeMap<String, AliasEntry>,
    start: StartClause,
    traversals: Vec<Traversal>,
    predicates: Vec<NodePredicate>,
    order_by: Vec<OrderSpec>,
    limit: Option<u64>,
    offset: Option<u64>,
    temporal_mode: TemporalMode,
    grouping: Grouping,
    current_alias: String,
    pending: Option<PendingTraversal>,
    error: Option<Error>,
}

impl QueryBuilder {
    pub(crate) fn start(
        core: Arc<EngineCore>,
        kind: &str,
        alias: &str,
        options: FromOptions,
    ) -> Self {
        let mut builder = Self {
            core,
            aliases: BTreeMap::new(),
            start: StartClause {
                alias: alias.to_owned(),
                kinds: vec![kind.to_owned()],
                include_sub_classes: options.include_sub_classes,
            },
            traversals: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            temporal_mode: TemporalMode::Current,
            grouping: Grouping::default(),
            current_alias: alias.to_owned(),
            pending: None,
            error: None,
        };
        if let Err(error) = check_alias(alias) {
            builder.error = Some(error);
            return builder;
        }
        if builder.core.graph.node(kind).is_none() {
            builder.error = Some(Error::KindNotFound {
                kind: kind.to_owned(),
            });
            return builder;
        }
        let kinds = builder
            .core
            .graph
            .expand_node_kind(kind, options.include_sub_classes);
        builder.start.kinds = kinds.clone();
        builder.aliases.insert(
            alias.to_owned(),
            AliasEntry {
                target_type: TargetType::Node,
                kinds,
                optional: false,
            },
        );
        builder
    }

    fn fail(mut self, error: Error) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    fn claim_alias(&mut self, alias: &str, entry: AliasEntry) -> Result<()> {
        check_alias(alias)?;
        if self.aliases.contains_key(alias) {
            return Err(Error::validation_at(
                format!("alias '{alias}' is already in use"),
                alias,
            ));
        }
        self.aliases.insert(alias.to_owned(), entry);
        Ok(())
    }

    /// Begins an edge traversal from the current alias.
    pub fn traverse(self, edge_kind: &str, edge_alias: &str) -> Self {
        self.traverse_with(edge_kind, edge_alias, TraverseOptions::default())
    }

    /// Begins an optional (LEFT JOIN) edge traversal.
    pub fn optional_traverse(self, edge_kind: &str, edge_alias: &str) -> Self {
        self.traverse_with(
            edge_kind,
            edge_alias,
            TraverseOptions {
                ..TraverseOptions::default()
            },
        )
        .mark_pending_optional()
    }

    fn mark_pending_optional(mut self) -> Self {
        if let Some(pending) = &mut self.pending {
            pending.optional = true;
        }
        self
    }

    /// Begins an edge traversal with explicit options.
    pub fn traverse_with(
        mut self,
        edge_kind: &str,
        edge_alias: &str,
        options: TraverseOptions,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.pending.is_some() {
            return self.fail(Error::validation(
                "previous traversal is missing its to() target",
            ));
        }
        if self.core.graph.edge(edge_kind).is_none() {
            return self.fail(Error::KindNotFound {
                kind: edge_kind.to_owned(),
            });
        }
        let join_from_alias = options
            .from
            .clone()
            .unwrap_or_else(|| self.current_alias.clone());
        let source = match self.aliases.get(&join_from_alias) {
            Some(entry) if entry.target_type == TargetType::Node => entry.clone(),
            Some(_) => {
                return self.fail(Error::validation_at(
                    format!("traversal source '{join_from_alias}' is an edge alias"),
                    join_from_alias,
                ));
            }
            None => {
                return self.fail(Error::validation_at(
                    format!("unknown traversal source alias '{join_from_alias}'"),
                    join_from_alias,
                ));
            }
        };
        let direction = options.direction.unwrap_or(Direction::Out);

        let mut edge_kinds = vec![edge_kind.to_owned()];
        if matches!(options.expand, EdgeExpand::Implying | EdgeExpand::All) {
            for implied in self.core.graph.ontology.expand_implying_edges(edge_kind) {
                if !edge_kinds.contains(&implied) {
                    edge_kinds.push(implied);
                }
            }
        }
        let mut inverse_edge_kinds = Vec::new();
        if matches!(options.expand, EdgeExpand::Inverse | EdgeExpand::All) {
            for kind in &edge_kinds {
                if let Some(inverse) = self.core.graph.ontology.get_inverse_edge(kind) {
                    if !inverse_edge_kinds.contains(&inverse) {
                        inverse_edge_kinds.push(inverse);
                    }
                }
            }
        }

        let entry = AliasEntry {
            target_type: TargetType::Edge,
            kinds: edge_kinds.clone(),
            optional: source.optional,
        };
        if let Err(error) = self.claim_alias(edge_alias, entry) {
            return self.fail(error);
        }
        self.pending = Some(PendingTraversal {
            edge_alias: edge_alias.to_owned(),
            edge_kinds,
            inverse_edge_kinds,
            direction,
            join_from_alias,
            optional: false,
            recursion: None,
        });
        self
    }

    /// Marks the pending traversal as variable-length.
    pub fn recursive(mut self, recursion: Recursion) -> Self {
        if self.error.is_some() {
            return self;
        }
        match &mut self.pending {
            Some(pending) => {
                pending.recursion = Some(recursion);
                self
            }
            None => self.fail(Error::validation(
                "recursive() must follow traverse() before to()",
            )),
        }
    }

    /// Finalizes the pending traversal onto a target node kind.
    pub fn to(self, kind: &str, alias: &str) -> Self {
        self.to_with(kind, alias, ToOptions::default())
    }

    /// Finalizes the pending traversal with explicit target options.
    pub fn to_with(mut self, kind: &str, alias: &str, options: ToOptions) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(pending) = self.pending.take() else {
            return self.fail(Error::validation("to() requires a preceding traverse()"));
        };
        if self.core.graph.node(kind).is_none() {
            return self.fail(Error::KindNotFound {
                kind: kind.to_owned(),
            });
        }
        // Edge-target validity against the declared endpoint kinds.
        let primary_edge = &pending.edge_kinds[0];
        if let Some(edge_def) = self.core.graph.edge(primary_edge) {
            let (declared, side) = match pending.direction {
                Direction::Out => (&edge_def.to, "to"),
                Direction::In => (&edge_def.from, "from"),
            };
            if !declared.iter().any(|k| k == kind) {
                return self.fail(Error::Endpoint {
                    kind: primary_edge.clone(),
                    side,
                    endpoint_kind: kind.to_owned(),
                });
            }
        }

        let node_kinds = self
            .core
            .graph
            .expand_node_kind(kind, options.include_sub_classes);
        let source_optional = self
            .aliases
            .get(&pending.join_from_alias)
            .map(|entry| entry.optional)
            .unwrap_or(false);
        let optional = pending.optional || source_optional;
        if let Err(error) = self.claim_alias(
            alias,
            AliasEntry {
                target_type: TargetType::Node,
                kinds: node_kinds.clone(),
                optional,
            },
        ) {
            return self.fail(error);
        }
        if optional {
            if let Some(edge_entry) = self.aliases.get_mut(&pending.edge_alias) {
                edge_entry.optional = true;
            }
        }

        let variable_length = match pending.recursion {
            Some(recursion) => {
                let spec = recursion.into_spec(alias);
                if let Err(error) = check_recursive_spec(&spec) {
                    return self.fail(error);
                }
                for extra in [&spec.path_alias, &spec.depth_alias].into_iter().flatten() {
                    if let Err(error) = check_alias(extra) {
                        return self.fail(error);
                    }
                    if self.aliases.contains_key(extra) {
                        return self.fail(Error::validation_at(
                            format!("result column '{extra}' collides with an alias"),
                            extra.as_str(),
                        ));
                    }
                }
                Some(spec)
            }
            None => None,
        };

        let join_edge_field = match pending.direction {
            Direction::Out => JoinEdgeField::FromId,
            Direction::In => JoinEdgeField::ToId,
        };
        self.traversals.push(Traversal {
            edge_alias: pending.edge_alias,
            edge_kinds: pending.edge_kinds,
            inverse_edge_kinds: pending.inverse_edge_kinds,
            direction: pending.direction,
            node_alias: alias.to_owned(),
            node_kinds,
            join_from_alias: pending.join_from_alias,
            join_edge_field,
            // A traversal joining off an optional source must stay outer.
            optional,
            variable_length,
        });
        self.current_alias = alias.to_owned();
        self
    }

    /// Attaches a predicate on a node alias.
    pub fn where_node<F>(self, alias: &str, build: F) -> Self
    where
        F: FnOnce(&FieldSource<'_>) -> Predicate,
    {
        self.attach_predicate(alias, TargetType::Node, build)
    }

    /// Attaches a predicate on an edge alias.
    pub fn where_edge<F>(self, alias: &str, build: F) -> Self
    where
        F: FnOnce(&FieldSource<'_>) -> Predicate,
    {
        self.attach_predicate(alias, TargetType::Edge, build)
    }

    fn attach_predicate<F>(mut self, alias: &str, target_type: TargetType, build: F) -> Self
    where
        F: FnOnce(&FieldSource<'_>) -> Predicate,
    {
        if self.error.is_some() {
            return self;
        }
        let entry = match self.aliases.get(alias) {
            Some(entry) if entry.target_type == target_type => entry.clone(),
            Some(entry) => {
                let expected = match entry.target_type {
                    TargetType::Node => "whereNode",
                    TargetType::Edge => "whereEdge",
                };
                return self.fail(Error::validation_at(
                    format!("alias '{alias}' must be filtered with {expected}"),
                    alias,
                ));
            }
            None => {
                return self.fail(Error::validation_at(
                    format!("unknown alias '{alias}'"),
                    alias,
                ));
            }
        };
        let source = FieldSource::new(alias, target_type, entry.kinds, &self.core.introspector);
        let predicate = build(&source);
        match predicate.into_expression() {
            Ok(expression) => {
                self.predicates.push(NodePredicate {
                    target_alias: alias.to_owned(),
                    target_type,
                    expression,
                });
                self
            }
            Err(error) => self.fail(error),
        }
    }

    /// Adds an ORDER BY entry on a property field.
    pub fn order_by(mut self, alias: &str, field: &str, direction: SortDirection) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(entry) = self.aliases.get(alias).cloned() else {
            return self.fail(Error::validation_at(
                format!("unknown alias '{alias}'"),
                alias,
            ));
        };
        let info = match entry.target_type {
            TargetType::Node => self
                .core
                .introspector
                .shared_field_type_info(&entry.kinds, field),
            TargetType::Edge => self
                .core
                .introspector
                .shared_edge_field_type_info(&entry.kinds, field),
        };
        let mut field_ref =
            FieldRef::prop(alias, field).with_type(info.as_ref().map(|i| i.value_type));
        field_ref.element_type = info.and_then(|i| i.element_type);
        self.order_by.push(OrderSpec {
            field: field_ref,
            direction,
        });
        self
    }

    /// Adds an ORDER BY entry on a nested object path.
    ///
    /// Deep paths order correctly but are excluded from the optimized
    /// pagination plan, which requires single-segment property fields.
    pub fn order_by_path<S: Into<String>>(
        mut self,
        alias: &str,
        path: impl IntoIterator<Item = S>,
        direction: SortDirection,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(entry) = self.aliases.get(alias).cloned() else {
            return self.fail(Error::validation_at(
                format!("unknown alias '{alias}'"),
                alias,
            ));
        };
        let segments: Vec<String> = path.into_iter().map(Into::into).collect();
        let Some(first) = segments.first() else {
            return self.fail(Error::validation("orderByPath requires at least one segment"));
        };
        let mut info = match entry.target_type {
            TargetType::Node => self
                .core
                .introspector
                .shared_field_type_info(&entry.kinds, first),
            TargetType::Edge => self
                .core
                .introspector
                .shared_edge_field_type_info(&entry.kinds, first),
        };
        for segment in &segments[1..] {
            info = info.and_then(|i| i.descend(segment).cloned());
        }
        let mut field = FieldRef::prop(alias, first.clone());
        field.json_pointer = segments;
        field.value_type = info.as_ref().map(|i| i.value_type);
        field.element_type = info.and_then(|i| i.element_type);
        self.order_by.push(OrderSpec { field, direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the temporal visibility of the query.
    pub fn temporal(mut self, mode: TemporalMode) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let TemporalMode::AsOf(instant) = &mode {
            if Value::date(instant).is_none() {
                return self.fail(Error::validation_at(
                    format!("asOf instant '{instant}' is not valid ISO-8601"),
                    "temporal.asOf",
                ));
            }
        }
        self.temporal_mode = mode;
        self
    }

    /// Adds a grouping key on a property field.
    pub fn group_by(mut self, alias: &str, field: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(entry) = self.aliases.get(alias).cloned() else {
            return self.fail(Error::validation_at(
                format!("unknown alias '{alias}'"),
                alias,
            ));
        };
        let info = match entry.target_type {
            TargetType::Node => self
                .core
                .introspector
                .shared_field_type_info(&entry.kinds, field),
            TargetType::Edge => self
                .core
                .introspector
                .shared_edge_field_type_info(&entry.kinds, field),
        };
        self.grouping.keys.push(
            FieldRef::prop(alias, field).with_type(info.map(|i| i.value_type)),
        );
        self
    }

    /// Groups by a node's identity instead of a property.
    pub fn group_by_node(mut self, alias: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        if !self.aliases.contains_key(alias) {
            return self.fail(Error::validation_at(
                format!("unknown alias '{alias}'"),
                alias,
            ));
        }
        self.grouping
            .keys
            .push(FieldRef::system(alias, crate::query::ast::FieldPath::Id));
        self
    }

    /// Attaches a HAVING filter over aggregates.
    pub fn having<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&AggregateSource) -> Predicate,
    {
        if self.error.is_some() {
            return self;
        }
        let source = AggregateSource;
        match build(&source).into_expression() {
            Ok(expression) => {
                self.grouping.having = Some(expression);
                self
            }
            Err(error) => self.fail(error),
        }
    }

    /// Applies a reusable fragment; composition is left-to-right.
    pub fn pipe<F>(self, fragment: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        fragment(self)
    }

    /// Materializes the immutable AST, running the deferred validations.
    pub fn to_ast(self) -> Result<QueryAst> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.pending.is_some() {
            return Err(Error::validation(
                "traversal is missing its to() target",
            ));
        }
        for predicate in &self.predicates {
            check_vector_placement(&predicate.expression)?;
        }
        let projection = build_blob_projection(&self.start, &self.traversals);
        Ok(QueryAst {
            graph_id: self.core.graph.id.clone(),
            start: self.start,
            traversals: self.traversals,
            predicates: self.predicates,
            projection,
            temporal_mode: self.temporal_mode,
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
            grouping: self.grouping,
            aggregate_projection: Vec::new(),
            selective_fields: None,
        })
    }

    /// Terminal step: full-blob projection plus a select callback.
    pub fn select<F>(self, select_fn: F) -> Result<ExecutableQuery>
    where
        F: Fn(&SelectContext) -> Value + Send + Sync + 'static,
    {
        let core = Arc::clone(&self.core);
        let ast = self.to_ast()?;
        Ok(ExecutableQuery::new(core, ast, Arc::new(select_fn)))
    }

    /// Terminal step: aggregate projection map.
    pub fn aggregate<K>(
        self,
        projections: impl IntoIterator<Item = (K, AggregateOutput)>,
    ) -> Result<ExecutableAggregateQuery>
    where
        K: Into<String>,
    {
        let core = Arc::clone(&self.core);
        let aliases = self.aliases.clone();
        let mut ast = self.to_ast()?;
        let mut outputs = Vec::new();
        for (output_name, projection) in projections {
            let output_name = output_name.into();
            let expr = match projection {
                AggregateOutput::Field { alias, field } => {
                    if !aliases.contains_key(&alias) {
                        return Err(Error::validation_at(
                            format!("unknown alias '{alias}'"),
                            alias,
                        ));
                    }
                    AggregateProjectionExpr::Field(FieldRef::prop(alias, field))
                }
                AggregateOutput::Aggregate(aggregate) => {
                    if let Some(field) = &aggregate.field {
                        if !aliases.contains_key(&field.alias) {
                            return Err(Error::validation_at(
                                format!("unknown alias '{}'", field.alias),
                                field.alias.clone(),
                            ));
                        }
                    }
                    AggregateProjectionExpr::Aggregate(aggregate)
                }
            };
            outputs.push(AggregateProjection { output_name, expr });
        }
        if outputs.is_empty() {
            return Err(Error::validation("aggregate() requires at least one output"));
        }
        ast.aggregate_projection = outputs;
        ast.projection = Vec::new();
        Ok(ExecutableAggregateQuery::new(core, ast))
    }
}

/// Builds the nine/ten-column blob projection for every alias.
pub(crate) fn build_blob_projection(
    start: &StartClause,
    traversals: &[Traversal],
) -> Vec<ProjectedField> {
    let mut projection = Vec::new();
    push_node_columns(&mut projection, &start.alias, None);
    for traversal in traversals {
        let target_cte = format!("cte_{}", traversal.node_alias);
        push_edge_columns(&mut projection, &traversal.edge_alias, &target_cte);
        push_node_columns(&mut projection, &traversal.node_alias, None);
    }
    projection
}

fn push_node_columns(
    projection: &mut Vec<ProjectedField>,
    alias: &str,
    cte_alias: Option<String>,
) {
    for column in NODE_BLOB_COLUMNS {
        projection.push(ProjectedField {
            output_name: format!("{alias}__{column}"),
            source: ProjectionSource::Column {
                alias: alias.to_owned(),
                column: (*column).to_owned(),
            },
            cte_alias: cte_alias.clone(),
        });
    }
}

fn push_edge_columns(projection: &mut Vec<ProjectedField>, alias: &str, target_cte: &str) {
    for column in EDGE_BLOB_COLUMNS {
        projection.push(ProjectedField {
            output_name: format!("{alias}__{column}"),
            source: ProjectionSource::Column {
                alias: alias.to_owned(),
                column: (*column).to_owned(),
            },
            cte_alias: Some(target_cte.to_owned()),
        });
    }
}

/// Aggregate accessor surface for HAVING callbacks.
pub struct AggregateSource;

impl AggregateSource {
    pub fn count(&self) -> AggregateAccessor {
        AggregateAccessor {
            aggregate: AggregateExpr {
                func: AggregateFunc::Count,
                field: None,
            },
        }
    }

    pub fn count_distinct(&self, alias: &str, field: &str) -> AggregateAccessor {
        self.over(AggregateFunc::CountDistinct, alias, field)
    }

    pub fn sum(&self, alias: &str, field: &str) -> AggregateAccessor {
        self.over(AggregateFunc::Sum, alias, field)
    }

    pub fn avg(&self, alias: &str, field: &str) -> AggregateAccessor {
        self.over(AggregateFunc::Avg, alias, field)
    }

    pub fn min(&self, alias: &str, field: &str) -> AggregateAccessor {
        self.over(AggregateFunc::Min, alias, field)
    }

    pub fn max(&self, alias: &str, field: &str) -> AggregateAccessor {
        self.over(AggregateFunc::Max, alias, field)
    }

    fn over(&self, func: AggregateFunc, alias: &str, field: &str) -> AggregateAccessor {
        AggregateAccessor {
            aggregate: AggregateExpr {
                func,
                field: Some(FieldRef::prop(alias, field)),
            },
        }
    }
}

/// Comparison surface over one aggregate expression.
pub struct AggregateAccessor {
    aggregate: AggregateExpr,
}

impl AggregateAccessor {
    fn compare(
        &self,
        op: crate::query::ast::ComparisonOp,
        value: impl Into<Operand>,
    ) -> Predicate {
        Predicate {
            expression: Ok(crate::query::ast::PredicateExpression::AggregateComparison {
                aggregate: self.aggregate.clone(),
                op,
                value: value.into(),
            }),
        }
    }

    pub fn eq(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(crate::query::ast::ComparisonOp::Eq, value)
    }

    pub fn neq(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(crate::query::ast::ComparisonOp::Neq, value)
    }

    pub fn gt(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(crate::query::ast::ComparisonOp::Gt, value)
    }

    pub fn gte(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(crate::query::ast::ComparisonOp::Gte, value)
    }

    pub fn lt(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(crate::query::ast::ComparisonOp::Lt, value)
    }

    pub fn lte(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(crate::query::ast::ComparisonOp::Lte, value)
    }
}

/// Aggregate projection entry handed to [`QueryBuilder::aggregate`].
#[derive(Clone, Debug)]
pub enum AggregateOutput {
    Field { alias: String, field: String },
    Aggregate(AggregateExpr),
}

/// Helpers for building aggregate projection maps.
pub mod agg {
    use super::AggregateOutput;
    use crate::query::ast::{AggregateExpr, AggregateFunc, FieldRef};

    pub fn field(alias: &str, field: &str) -> AggregateOutput {
        AggregateOutput::Field {
            alias: alias.to_owned(),
            field: field.to_owned(),
        }
    }

    pub fn count() -> AggregateOutput {
        AggregateOutput::Aggregate(AggregateExpr {
            func: AggregateFunc::Count,
            field: None,
        })
    }

    pub fn count_distinct(alias: &str, field: &str) -> AggregateOutput {
        over(AggregateFunc::CountDistinct, alias, field)
    }

    pub fn sum(alias: &str, field: &str) -> AggregateOutput {
        over(AggregateFunc::Sum, alias, field)
    }

    pub fn avg(alias: &str, field: &str) -> AggregateOutput {
        over(AggregateFunc::Avg, alias, field)
    }

    pub fn min(alias: &str, field: &str) -> AggregateOutput {
        over(AggregateFunc::Min, alias, field)
    }

    pub fn max(alias: &str, field: &str) -> AggregateOutput {
        over(AggregateFunc::Max, alias, field)
    }

    fn over(func: AggregateFunc, alias: &str, field: &str) -> AggregateOutput {
        AggregateOutput::Aggregate(AggregateExpr {
            func,
            field: Some(FieldRef::prop(alias, field)),
        })
    }
}
