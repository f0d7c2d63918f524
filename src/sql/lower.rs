//! Dialect-parameterized AST lowering.
//!
//! Both dialects share one lowering pass; everything dialect-specific (JSON
//! extraction, placeholders, recursive path columns, vector distance) goes
//! through the [`SqlFlavor`] hooks. The pass emits text and parameter slots
//! strictly in statement order, so placeholder positions always line up with
//! the slot vector.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::query::ast::{
    AggregateExpr, AggregateFunc, AggregateProjectionExpr, ArrayOpKind, ComparisonOp, Direction,
    FieldPath, FieldRef, NodePredicate, ObjectOpKind, PredicateExpression, ProjectionSource,
    QueryAst, SortDirection, StringOpKind, TemporalMode, Traversal, VectorMetric,
};
use crate::query::validate::MAX_RECURSIVE_DEPTH;
use crate::schema::ValueType;
use crate::sql::{CompiledSql, ParamSlot, SqlValue};
use crate::value::{Operand, Value};

/// Dialect-specific SQL fragments consumed by the shared lowering.
pub(crate) trait SqlFlavor: Send + Sync {
    /// Placeholder text for the 1-based parameter position.
    fn placeholder(&self, index: usize) -> String;

    /// Scalar extraction from a JSON column at a pointer.
    fn json_scalar(
        &self,
        column_expr: &str,
        pointer: &[String],
        value_type: Option<ValueType>,
    ) -> String;

    /// Raw JSON extraction (arrays, objects, embeddings).
    fn json_raw(&self, column_expr: &str, pointer: &[String]) -> String;

    /// Presence test for a JSON path (distinguishes missing from null).
    fn json_has_path(&self, column_expr: &str, pointer: &[String]) -> String;

    fn json_array_length(&self, column_expr: &str, pointer: &[String]) -> String;

    /// Membership test for one element placeholder inside a JSON array.
    fn array_element_match(
        &self,
        column_expr: &str,
        pointer: &[String],
        placeholder: &str,
    ) -> String;

    /// Membership test against several placeholders at once.
    fn array_any_match(
        &self,
        column_expr: &str,
        pointer: &[String],
        placeholders: &[String],
    ) -> String;

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String;

    /// Seed/step/check expressions for recursive path and visited tracking.
    fn path_seed(&self, root_expr: &str, node_expr: &str) -> String;
    fn path_step(&self, prev_expr: &str, node_expr: &str) -> String;
    fn visited_seed(&self, root_expr: &str, node_expr: &str) -> String;
    fn visited_step(&self, prev_expr: &str, node_expr: &str) -> String;
    fn visited_excludes(&self, visited_expr: &str, node_expr: &str) -> String;

    fn supports_vectors(&self) -> bool;
    fn vector_distance(&self, expr: &str, placeholder: &str, metric: VectorMetric) -> String;
    /// Filter keeping rows at or better than a minimum score for the metric.
    fn vector_min_score(&self, expr: &str, vec_ph: &str, score_ph: &str, metric: VectorMetric)
        -> String;
    fn format_embedding(&self, vector: &[f32]) -> SqlValue;

    fn bind_value(&self, value: &Value) -> Result<SqlValue>;
}

/// Node-alias columns every CTE projects.
const CTE_NODE_COLUMNS: &[&str] = &[
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

/// Edge columns carried by a traversal target's CTE, `edge_`-prefixed.
const CTE_EDGE_COLUMNS: &[&str] = &[
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

#[derive(Clone, Debug)]
struct AliasBinding {
    /// Table alias in the main query (always a node alias).
    table: String,
    /// Column prefix: empty for nodes, `edge_` for edge aliases.
    prefix: &'static str,
}

#[derive(Clone, Debug)]
struct VectorPlan {
    field: FieldRef,
    query: Vec<f32>,
    k: u64,
    metric: VectorMetric,
    min_score: Option<f64>,
}

/// Compiles one query AST with the given flavor.
pub(crate) fn compile_query(
    flavor: &dyn SqlFlavor,
    ast: &QueryAst,
    graph_id: &str,
    namespace: &str,
    param_offset: usize,
) -> Result<CompiledSql> {
    Lowering::new(flavor, ast, graph_id, namespace, param_offset).compile()
}

struct Lowering<'a> {
    flavor: &'a dyn SqlFlavor,
    ast: &'a QueryAst,
    graph_id: &'a str,
    namespace: String,
    sql: String,
    params: Vec<ParamSlot>,
    param_offset: usize,
    bindings: FxHashMap<String, AliasBinding>,
    subquery_count: usize,
}

impl<'a> Lowering<'a> {
    fn new(
        flavor: &'a dyn SqlFlavor,
        ast: &'a QueryAst,
        graph_id: &'a str,
        namespace: &str,
        param_offset: usize,
    ) -> Self {
        Self {
            flavor,
            ast,
            graph_id,
            namespace: namespace.to_owned(),
            sql: String::new(),
            params: Vec::new(),
            param_offset,
            bindings: FxHashMap::default(),
            subquery_count: 0,
        }
    }

    fn compile(mut self) -> Result<CompiledSql> {
        self.collect_bindings();
        let (vector, predicates) = self.extract_vector_plan()?;
        self.emit_with_clause()?;
        self.emit_select_clause()?;
        self.emit_from_clause();
        self.emit_where_clause(&vector, &predicates)?;
        self.emit_group_by()?;
        self.emit_having()?;
        self.emit_order_by(&vector)?;
        self.emit_limit(&vector);
        Ok(CompiledSql {
            sql: self.sql,
            params: self.params,
        })
    }

    fn collect_bindings(&mut self) {
        self.bindings.insert(
            self.ast.start.alias.clone(),
            AliasBinding {
                table: self.ast.start.alias.clone(),
                prefix: "",
            },
        );
        for traversal in &self.ast.traversals {
            self.bindings.insert(
                traversal.node_alias.clone(),
                AliasBinding {
                    table: traversal.node_alias.clone(),
                    prefix: "",
                },
            );
            self.bindings.insert(
                traversal.edge_alias.clone(),
                AliasBinding {
                    table: traversal.node_alias.clone(),
                    prefix: "edge_",
                },
            );
        }
    }

    fn cte_name(&self, alias: &str) -> String {
        format!("cte_{}{alias}", self.namespace)
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Runs an emitter, returning the text it produced instead of keeping it
    /// in the statement. Parameters it pushed stay pushed, so the caller must
    /// re-insert the text at the same position.
    fn capture<F>(&mut self, emit: F) -> Result<String>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let before = self.sql.len();
        emit(self)?;
        let text = self.sql[before..].to_owned();
        self.sql.truncate(before);
        Ok(text)
    }

    fn next_placeholder(&mut self, slot: ParamSlot) -> String {
        self.params.push(slot);
        self.flavor
            .placeholder(self.param_offset + self.params.len())
    }

    fn value_param(&mut self, value: &Value) -> Result<String> {
        let bound = self.flavor.bind_value(value)?;
        Ok(self.next_placeholder(ParamSlot::Value(bound)))
    }

    fn operand_param(&mut self, operand: &Operand, string_op: bool) -> Result<String> {
        match operand {
            Operand::Literal(value) => self.value_param(value),
            Operand::Param(name) => Ok(self.next_placeholder(ParamSlot::Param {
                name: name.clone(),
                string_op,
            })),
        }
    }

    // ---- vector plan ----

    fn extract_vector_plan(&self) -> Result<(Option<VectorPlan>, Vec<NodePredicate>)> {
        let mut plan: Option<VectorPlan> = None;
        let mut remaining = Vec::new();
        for predicate in &self.ast.predicates {
            let (mut leaves, rest) = strip_vector_leaves(predicate.expression.clone());
            if !leaves.is_empty() {
                if plan.is_some() || leaves.len() > 1 {
                    return Err(Error::unsupported_predicate(
                        "only one vector similarity predicate is supported per query",
                    ));
                }
                if !self.flavor.supports_vectors() {
                    return Err(Error::unsupported_predicate(
                        "dialect does not support vector search",
                    ));
                }
                plan = leaves.pop();
            }
            if let Some(expression) = rest {
                remaining.push(NodePredicate {
                    target_alias: predicate.target_alias.clone(),
                    target_type: predicate.target_type,
                    expression,
                });
            }
        }
        Ok((plan, remaining))
    }

    // ---- WITH clause ----

    fn emit_with_clause(&mut self) -> Result<()> {
        let recursive = self
            .ast
            .traversals
            .iter()
            .any(|t| t.variable_length.is_some());
        self.push(if recursive { "WITH RECURSIVE " } else { "WITH " });
        self.emit_start_cte()?;
        let traversals: Vec<Traversal> = self.ast.traversals.clone();
        for traversal in &traversals {
            self.push(", ");
            if traversal.variable_length.is_some() {
                self.emit_recursive_cte(traversal)?;
            } else {
                self.emit_traversal_cte(traversal)?;
            }
        }
        self.push(" ");
        Ok(())
    }

    fn emit_start_cte(&mut self) -> Result<()> {
        let name = self.cte_name(&self.ast.start.alias);
        self.push(&name);
        self.push(" AS (SELECT ");
        for (index, column) in CTE_NODE_COLUMNS.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.push(&format!("n.{column} AS {column}"));
        }
        self.push(" FROM nodes n WHERE n.graph_id = ");
        let graph_param = self.value_param(&Value::from(self.graph_id))?;
        self.push(&graph_param);
        self.push(" AND ");
        let kinds = self.ast.start.kinds.clone();
        self.emit_kind_filter("n.kind", &kinds)?;
        self.emit_temporal_filter("n")?;
        self.push(")");
        Ok(())
    }

    /// Source-side and target-side endpoint columns for a traversal.
    fn endpoint_columns(traversal: &Traversal) -> (&'static str, &'static str) {
        match traversal.direction {
            Direction::Out => ("from_id", "to_id"),
            Direction::In => ("to_id", "from_id"),
        }
    }

    fn emit_join_expr(&mut self, traversal: &Traversal) -> Result<()> {
        let (src, dst) = Self::endpoint_columns(traversal);
        if traversal.inverse_edge_kinds.is_empty() {
            self.push(&format!("e.{src}"));
        } else {
            self.push("CASE WHEN ");
            let inverse = traversal.inverse_edge_kinds.clone();
            self.emit_kind_filter("e.kind", &inverse)?;
            self.push(&format!(" THEN e.{dst} ELSE e.{src} END"));
        }
        Ok(())
    }

    fn emit_target_expr(&mut self, traversal: &Traversal) -> Result<()> {
        let (src, dst) = Self::endpoint_columns(traversal);
        if traversal.inverse_edge_kinds.is_empty() {
            self.push(&format!("e.{dst}"));
        } else {
            self.push("CASE WHEN ");
            let inverse = traversal.inverse_edge_kinds.clone();
            self.emit_kind_filter("e.kind", &inverse)?;
            self.push(&format!(" THEN e.{src} ELSE e.{dst} END"));
        }
        Ok(())
    }

    fn emit_edge_kind_condition(&mut self, traversal: &Traversal) -> Result<()> {
        if traversal.inverse_edge_kinds.is_empty() {
            let kinds = traversal.edge_kinds.clone();
            self.emit_kind_filter("e.kind", &kinds)?;
        } else {
            self.push("(");
            let kinds = traversal.edge_kinds.clone();
            self.emit_kind_filter("e.kind", &kinds)?;
            self.push(" OR ");
            let inverse = traversal.inverse_edge_kinds.clone();
            self.emit_kind_filter("e.kind", &inverse)?;
            self.push(")");
        }
        Ok(())
    }

    fn emit_kind_filter(&mut self, column: &str, kinds: &[String]) -> Result<()> {
        if kinds.len() == 1 {
            self.push(column);
            self.push(" = ");
            let ph = self.value_param(&Value::from(kinds[0].as_str()))?;
            self.push(&ph);
        } else {
            self.push(column);
            self.push(" IN (");
            for (index, kind) in kinds.iter().enumerate() {
                if index > 0 {
                    self.push(", ");
                }
                let ph = self.value_param(&Value::from(kind.as_str()))?;
                self.push(&ph);
            }
            self.push(")");
        }
        Ok(())
    }

    fn emit_temporal_filter(&mut self, table: &str) -> Result<()> {
        match &self.ast.temporal_mode {
            TemporalMode::Current => {
                self.push(&format!(
                    " AND {table}.deleted_at IS NULL AND {table}.valid_to IS NULL"
                ));
            }
            TemporalMode::All => {}
            TemporalMode::AsOf(instant) => {
                let instant = instant.clone();
                self.push(&format!(" AND {table}.valid_from <= "));
                let p1 = self.value_param(&Value::from(instant.as_str()))?;
                self.push(&p1);
                self.push(&format!(" AND ({table}.valid_to IS NULL OR {table}.valid_to > "));
                let p2 = self.value_param(&Value::from(instant.as_str()))?;
                self.push(&p2);
                self.push(&format!(
                    ") AND ({table}.deleted_at IS NULL OR {table}.deleted_at > "
                ));
                let p3 = self.value_param(&Value::from(instant.as_str()))?;
                self.push(&p3);
                self.push(")");
            }
        }
        Ok(())
    }

    fn emit_cte_entity_columns(&mut self) {
        for (index, column) in CTE_NODE_COLUMNS.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.push(&format!("n.{column} AS {column}"));
        }
        for column in CTE_EDGE_COLUMNS {
            self.push(&format!(", e.{column} AS edge_{column}"));
        }
    }

    fn emit_traversal_cte(&mut self, traversal: &Traversal) -> Result<()> {
        let name = self.cte_name(&traversal.node_alias);
        self.push(&name);
        self.push(" AS (SELECT ");
        self.emit_cte_entity_columns();
        self.push(", ");
        self.emit_join_expr(traversal)?;
        self.push(" AS join_id FROM edges e JOIN nodes n ON n.graph_id = e.graph_id AND n.id = ");
        self.emit_target_expr(traversal)?;
        self.push(" WHERE e.graph_id = ");
        let graph_param = self.value_param(&Value::from(self.graph_id))?;
        self.push(&graph_param);
        self.push(" AND ");
        self.emit_edge_kind_condition(traversal)?;
        self.push(" AND ");
        let node_kinds = traversal.node_kinds.clone();
        self.emit_kind_filter("n.kind", &node_kinds)?;
        self.emit_temporal_filter("e")?;
        self.emit_temporal_filter("n")?;
        self.push(")");
        Ok(())
    }

    fn emit_recursive_cte(&mut self, traversal: &Traversal) -> Result<()> {
        let spec = traversal
            .variable_length
            .as_ref()
            .expect("recursive traversal carries a spec");
        let bound = if spec.max_depth < 0 {
            MAX_RECURSIVE_DEPTH
        } else {
            spec.max_depth as u32
        };
        let name = self.cte_name(&traversal.node_alias);
        let source_cte = self.cte_name(&traversal.join_from_alias);
        let prevent_cycles =
            spec.cycle_policy == crate::query::ast::RecursiveCyclePolicy::Prevent;

        self.push(&name);
        self.push(" AS (SELECT ");
        self.emit_cte_entity_columns();
        self.push(", ");
        self.emit_join_expr(traversal)?;
        self.push(" AS root_id, 1 AS depth, ");
        // Seed path/visited with the root id and the first reached node.
        let root_text = self.capture(|lowering| lowering.emit_join_expr(traversal))?;
        self.push(&self.flavor.path_seed(&root_text, "n.id"));
        self.push(" AS path, ");
        let root_text = self.capture(|lowering| lowering.emit_join_expr(traversal))?;
        self.push(&self.flavor.visited_seed(&root_text, "n.id"));
        self.push(" AS visited FROM edges e JOIN nodes n ON n.graph_id = e.graph_id AND n.id = ");
        self.emit_target_expr(traversal)?;
        self.push(" WHERE e.graph_id = ");
        let graph_param = self.value_param(&Value::from(self.graph_id))?;
        self.push(&graph_param);
        self.push(" AND ");
        self.emit_edge_kind_condition(traversal)?;
        self.push(" AND ");
        let node_kinds = traversal.node_kinds.clone();
        self.emit_kind_filter("n.kind", &node_kinds)?;
        self.emit_temporal_filter("e")?;
        self.emit_temporal_filter("n")?;
        self.push(" AND ");
        self.emit_join_expr(traversal)?;
        self.push(&format!(" IN (SELECT id FROM {source_cte})"));

        self.push(" UNION ALL SELECT ");
        self.emit_cte_entity_columns();
        self.push(&format!(
            ", prev.root_id, prev.depth + 1, {}, {}",
            self.flavor.path_step("prev.path", "n.id"),
            self.flavor.visited_step("prev.visited", "n.id")
        ));
        self.push(&format!(" FROM {name} prev JOIN edges e ON e.graph_id = "));
        let graph_param = self.value_param(&Value::from(self.graph_id))?;
        self.push(&graph_param);
        self.push(" AND ");
        self.emit_edge_kind_condition(traversal)?;
        self.push(" AND ");
        self.emit_join_expr(traversal)?;
        self.push(" = prev.id JOIN nodes n ON n.graph_id = e.graph_id AND n.id = ");
        self.emit_target_expr(traversal)?;
        self.push(" AND ");
        let node_kinds = traversal.node_kinds.clone();
        self.emit_kind_filter("n.kind", &node_kinds)?;
        self.push(&format!(" WHERE prev.depth < {bound}"));
        self.emit_temporal_filter("e")?;
        self.emit_temporal_filter("n")?;
        if prevent_cycles {
            self.push(" AND ");
            self.push(&self.flavor.visited_excludes("prev.visited", "n.id"));
        }
        self.push(")");
        Ok(())
    }

    // ---- SELECT clause ----

    fn emit_select_clause(&mut self) -> Result<()> {
        self.push("SELECT ");
        if !self.ast.aggregate_projection.is_empty() {
            let outputs = self.ast.aggregate_projection.clone();
            for (index, output) in outputs.iter().enumerate() {
                if index > 0 {
                    self.push(", ");
                }
                let expr = match &output.expr {
                    AggregateProjectionExpr::Field(field) => self.field_expr(field, true)?,
                    AggregateProjectionExpr::Aggregate(aggregate) => {
                        self.aggregate_expr(aggregate)?
                    }
                };
                self.push(&expr);
                self.push(&format!(" AS {}", quote_ident(&output.output_name)));
            }
            return Ok(());
        }

        if let Some(selective) = self.ast.selective_fields.clone() {
            for (index, field) in selective.iter().enumerate() {
                if index > 0 {
                    self.push(", ");
                }
                let expr = self.selective_field_expr(field)?;
                self.push(&expr);
                self.push(&format!(" AS {}", quote_ident(&field.output_name)));
            }
            if selective.is_empty() {
                return Err(Error::unsupported_predicate(
                    "selective projection requires at least one field",
                ));
            }
        } else {
            let projection = self.ast.projection.clone();
            for (index, projected) in projection.iter().enumerate() {
                if index > 0 {
                    self.push(", ");
                }
                let expr = match &projected.source {
                    ProjectionSource::Column { alias, column } => {
                        self.entity_column_expr(alias, column)?
                    }
                    ProjectionSource::Field(field) => self.field_expr(field, true)?,
                };
                self.push(&expr);
                self.push(&format!(" AS {}", projected.output_name));
            }
        }

        // Recursive depth/path outputs.
        let traversals = self.ast.traversals.clone();
        for traversal in &traversals {
            if let Some(spec) = &traversal.variable_length {
                let table = traversal.node_alias.clone();
                if let Some(depth_alias) = &spec.depth_alias {
                    self.push(&format!(", {table}.depth AS {depth_alias}"));
                }
                if let Some(path_alias) = &spec.path_alias {
                    self.push(&format!(", {table}.path AS {path_alias}"));
                }
            }
        }

        // ORDER BY columns surfaced for cursor extraction.
        let order_by = self.ast.order_by.clone();
        for (index, spec) in order_by.iter().enumerate() {
            let expr = self.field_expr(&spec.field, true)?;
            self.push(&format!(", {expr} AS ob_{index}"));
        }
        Ok(())
    }

    fn entity_column_expr(&self, alias: &str, column: &str) -> Result<String> {
        let binding = self.binding(alias)?;
        Ok(format!("{}.{}{}", binding.table, binding.prefix, column))
    }

    fn selective_field_expr(
        &mut self,
        field: &crate::query::ast::SelectiveField,
    ) -> Result<String> {
        let binding = self.binding(&field.alias)?.clone();
        if field.is_system_field {
            let column = field.field.strip_prefix("meta.").unwrap_or(&field.field);
            return Ok(format!("{}.{}{}", binding.table, binding.prefix, column));
        }
        let props = format!("{}.{}props", binding.table, binding.prefix);
        let pointer = vec![field.field.clone()];
        let value_type = field.value_type.map(|tag| tag.0);
        Ok(match value_type {
            Some(ValueType::Array) | Some(ValueType::Object) | Some(ValueType::Embedding) => {
                self.flavor.json_raw(&props, &pointer)
            }
            Some(ValueType::Unknown) | None => self.flavor.json_raw(&props, &pointer),
            other => self.flavor.json_scalar(&props, &pointer, other),
        })
    }

    // ---- FROM clause ----

    fn emit_from_clause(&mut self) {
        let start = self.ast.start.alias.clone();
        let start_cte = self.cte_name(&start);
        self.push(&format!(" FROM {start_cte} AS {start}"));
        let traversals = self.ast.traversals.clone();
        for traversal in &traversals {
            let cte = self.cte_name(&traversal.node_alias);
            let alias = &traversal.node_alias;
            let source = &traversal.join_from_alias;
            let join = if traversal.optional { "LEFT JOIN" } else { "JOIN" };
            if let Some(spec) = &traversal.variable_length {
                self.push(&format!(
                    " {join} {cte} AS {alias} ON {alias}.root_id = {source}.id AND {alias}.depth >= {}",
                    spec.min_depth
                ));
            } else {
                self.push(&format!(
                    " {join} {cte} AS {alias} ON {alias}.join_id = {source}.id"
                ));
            }
        }
    }

    // ---- WHERE clause ----

    fn emit_where_clause(
        &mut self,
        vector: &Option<VectorPlan>,
        predicates: &[NodePredicate],
    ) -> Result<()> {
        let mut clauses: Vec<String> = Vec::new();
        for predicate in predicates {
            let clause = self.lower_expression(&predicate.expression)?;
            clauses.push(clause);
        }
        if let Some(plan) = vector {
            if let Some(min_score) = plan.min_score {
                let expr = self.vector_source_expr(plan)?;
                let vec_ph = self.vector_param(plan);
                let score_ph = self.value_param(&Value::from(min_score))?;
                clauses.push(self.flavor.vector_min_score(
                    &expr,
                    &vec_ph,
                    &score_ph,
                    plan.metric,
                ));
            }
        }
        if clauses.is_empty() {
            return Ok(());
        }
        self.push(" WHERE ");
        for (index, clause) in clauses.iter().enumerate() {
            if index > 0 {
                self.push(" AND ");
            }
            self.push("(");
            self.push(clause);
            self.push(")");
        }
        Ok(())
    }

    fn vector_source_expr(&self, plan: &VectorPlan) -> Result<String> {
        let binding = self.binding(&plan.field.alias)?;
        let props = format!("{}.{}props", binding.table, binding.prefix);
        Ok(self.flavor.json_raw(&props, &plan.field.json_pointer))
    }

    fn vector_param(&mut self, plan: &VectorPlan) -> String {
        let bound = self.flavor.format_embedding(&plan.query);
        self.next_placeholder(ParamSlot::Value(bound))
    }

    fn binding(&self, alias: &str) -> Result<&AliasBinding> {
        self.bindings.get(alias).ok_or_else(|| {
            Error::validation_at(format!("unknown alias '{alias}'"), alias)
        })
    }

    /// Scalar SQL expression for a field reference.
    fn field_expr(&mut self, field: &FieldRef, typed: bool) -> Result<String> {
        let binding = self.binding(&field.alias)?.clone();
        match field.path {
            FieldPath::Id => Ok(format!("{}.{}id", binding.table, binding.prefix)),
            FieldPath::Kind => Ok(format!("{}.{}kind", binding.table, binding.prefix)),
            FieldPath::FromId => {
                if binding.prefix.is_empty() {
                    return Err(Error::unsupported_predicate(
                        "from_id is only defined for edge aliases",
                    ));
                }
                Ok(format!("{}.{}from_id", binding.table, binding.prefix))
            }
            FieldPath::ToId => {
                if binding.prefix.is_empty() {
                    return Err(Error::unsupported_predicate(
                        "to_id is only defined for edge aliases",
                    ));
                }
                Ok(format!("{}.{}to_id", binding.table, binding.prefix))
            }
            FieldPath::Props => {
                let props = format!("{}.{}props", binding.table, binding.prefix);
                if field.json_pointer.is_empty() {
                    return Ok(props);
                }
                Ok(match field.value_type {
                    Some(ValueType::Array) | Some(ValueType::Object)
                    | Some(ValueType::Embedding) => {
                        self.flavor.json_raw(&props, &field.json_pointer)
                    }
                    value_type if typed => {
                        self.flavor.json_scalar(&props, &field.json_pointer, value_type)
                    }
                    _ => self.flavor.json_raw(&props, &field.json_pointer),
                })
            }
        }
    }

    fn aggregate_expr(&mut self, aggregate: &AggregateExpr) -> Result<String> {
        let inner = match &aggregate.field {
            Some(field) => self.field_expr(field, true)?,
            None => "*".to_owned(),
        };
        Ok(match aggregate.func {
            AggregateFunc::Count => format!("COUNT({inner})"),
            AggregateFunc::CountDistinct => format!("COUNT(DISTINCT {inner})"),
            AggregateFunc::Sum => format!("SUM({inner})"),
            AggregateFunc::Avg => format!("AVG({inner})"),
            AggregateFunc::Min => format!("MIN({inner})"),
            AggregateFunc::Max => format!("MAX({inner})"),
        })
    }

    fn lower_expression(&mut self, expression: &PredicateExpression) -> Result<String> {
        match expression {
            PredicateExpression::Comparison { field, op, value } => {
                self.lower_comparison(field, *op, value)
            }
            PredicateExpression::StringOp { field, op, value } => {
                self.lower_string_op(field, *op, value)
            }
            PredicateExpression::Between { field, low, high } => {
                let expr = self.field_expr(field, true)?;
                let low_ph = self.operand_param(low, false)?;
                let high_ph = self.operand_param(high, false)?;
                Ok(format!("{expr} BETWEEN {low_ph} AND {high_ph}"))
            }
            PredicateExpression::NullCheck { field, negated } => {
                let expr = self.field_expr(field, true)?;
                Ok(if *negated {
                    format!("{expr} IS NOT NULL")
                } else {
                    format!("{expr} IS NULL")
                })
            }
            PredicateExpression::ArrayOp { field, op } => self.lower_array_op(field, op),
            PredicateExpression::ObjectOp { field, op } => self.lower_object_op(field, op),
            PredicateExpression::AggregateComparison {
                aggregate,
                op,
                value,
            } => {
                let expr = self.aggregate_expr(aggregate)?;
                let ph = self.operand_param(value, false)?;
                Ok(format!("{expr} {} {ph}", comparison_token(*op)?))
            }
            PredicateExpression::VectorSimilarity { .. } => Err(Error::unsupported_predicate(
                "vector similarity leaf left inside the predicate tree",
            )),
            PredicateExpression::And(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    parts.push(format!("({})", self.lower_expression(child)?));
                }
                Ok(parts.join(" AND "))
            }
            PredicateExpression::Or(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    parts.push(format!("({})", self.lower_expression(child)?));
                }
                Ok(parts.join(" OR "))
            }
            PredicateExpression::Not(child) => {
                Ok(format!("NOT ({})", self.lower_expression(child)?))
            }
            PredicateExpression::Exists { subquery, negated } => {
                let sub = self.lower_subquery(subquery)?;
                let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
                Ok(format!("{keyword} (SELECT 1 FROM ({sub}) AS sq)"))
            }
            PredicateExpression::InSubquery {
                field,
                subquery,
                negated,
            } => {
                let expr = self.field_expr(field, true)?;
                let id_column = format!("{}__id", subquery.start.alias);
                let sub = self.lower_subquery(subquery)?;
                let keyword = if *negated { "NOT IN" } else { "IN" };
                Ok(format!(
                    "{expr} {keyword} (SELECT {id_column} FROM ({sub}) AS sq)"
                ))
            }
        }
    }

    fn lower_subquery(&mut self, ast: &QueryAst) -> Result<String> {
        self.subquery_count += 1;
        let namespace = format!("{}s{}_", self.namespace, self.subquery_count);
        let compiled = compile_query(
            self.flavor,
            ast,
            self.graph_id,
            &namespace,
            self.param_offset + self.params.len(),
        )?;
        self.params.extend(compiled.params);
        Ok(compiled.sql)
    }

    fn lower_comparison(
        &mut self,
        field: &FieldRef,
        op: ComparisonOp,
        value: &Operand,
    ) -> Result<String> {
        let expr = self.field_expr(field, true)?;
        match op {
            ComparisonOp::In | ComparisonOp::NotIn => {
                let values = match value {
                    Operand::Literal(Value::Array(values)) => values.clone(),
                    _ => {
                        return Err(Error::unsupported_predicate(
                            "IN requires a literal value list",
                        ));
                    }
                };
                let mut placeholders: SmallVec<[String; 8]> = SmallVec::new();
                for value in &values {
                    placeholders.push(self.value_param(value)?);
                }
                let keyword = if op == ComparisonOp::NotIn { "NOT IN" } else { "IN" };
                Ok(format!("{expr} {keyword} ({})", placeholders.join(", ")))
            }
            ComparisonOp::Eq if matches!(value, Operand::Literal(Value::Null)) => {
                Ok(format!("{expr} IS NULL"))
            }
            ComparisonOp::Neq if matches!(value, Operand::Literal(Value::Null)) => {
                Ok(format!("{expr} IS NOT NULL"))
            }
            _ => {
                let ph = self.operand_param(value, false)?;
                Ok(format!("{expr} {} {ph}", comparison_token(op)?))
            }
        }
    }

    fn lower_string_op(
        &mut self,
        field: &FieldRef,
        op: StringOpKind,
        value: &Operand,
    ) -> Result<String> {
        let expr = self.field_expr(field, true)?;
        let ph = self.operand_param(value, true)?;
        Ok(match op {
            StringOpKind::Contains => format!("{expr} LIKE '%' || {ph} || '%'"),
            StringOpKind::StartsWith => format!("{expr} LIKE {ph} || '%'"),
            StringOpKind::EndsWith => format!("{expr} LIKE '%' || {ph}"),
            StringOpKind::Like => format!("{expr} LIKE {ph}"),
            StringOpKind::ILike => self.flavor.case_insensitive_like(&expr, &ph),
        })
    }

    fn lower_array_op(&mut self, field: &FieldRef, op: &ArrayOpKind) -> Result<String> {
        let binding = self.binding(&field.alias)?.clone();
        let props = format!("{}.{}props", binding.table, binding.prefix);
        let pointer = &field.json_pointer;
        match op {
            ArrayOpKind::Contains(operand) => {
                let ph = self.operand_param(operand, false)?;
                Ok(self.flavor.array_element_match(&props, pointer, &ph))
            }
            ArrayOpKind::ContainsAll(values) => {
                let mut parts = Vec::with_capacity(values.len());
                for value in values {
                    let ph = self.value_param(value)?;
                    parts.push(self.flavor.array_element_match(&props, pointer, &ph));
                }
                Ok(parts
                    .into_iter()
                    .map(|part| format!("({part})"))
                    .collect::<Vec<_>>()
                    .join(" AND "))
            }
            ArrayOpKind::ContainsAny(values) => {
                let mut placeholders: SmallVec<[String; 8]> = SmallVec::new();
                for value in values {
                    placeholders.push(self.value_param(value)?);
                }
                Ok(self.flavor.array_any_match(&props, pointer, &placeholders))
            }
            ArrayOpKind::IsEmpty => Ok(format!(
                "{} = 0",
                self.flavor.json_array_length(&props, pointer)
            )),
            ArrayOpKind::IsNotEmpty => Ok(format!(
                "{} > 0",
                self.flavor.json_array_length(&props, pointer)
            )),
            ArrayOpKind::Length(op, length) => {
                let length_expr = self.flavor.json_array_length(&props, pointer);
                let ph = self.value_param(&Value::from(*length as i64))?;
                Ok(format!("{length_expr} {} {ph}", comparison_token(*op)?))
            }
        }
    }

    fn lower_object_op(&mut self, field: &FieldRef, op: &ObjectOpKind) -> Result<String> {
        let binding = self.binding(&field.alias)?.clone();
        let props = format!("{}.{}props", binding.table, binding.prefix);
        let with_path = |extra: &[String]| -> Vec<String> {
            field
                .json_pointer
                .iter()
                .chain(extra.iter())
                .cloned()
                .collect()
        };
        match op {
            ObjectOpKind::HasKey(key) => {
                let pointer = with_path(std::slice::from_ref(key));
                Ok(self.flavor.json_has_path(&props, &pointer))
            }
            ObjectOpKind::HasPath(path) => {
                let pointer = with_path(path);
                Ok(self.flavor.json_has_path(&props, &pointer))
            }
            ObjectOpKind::PathEquals(path, value) => {
                let pointer = with_path(path);
                let expr = self
                    .flavor
                    .json_scalar(&props, &pointer, Some(value.value_type()));
                let ph = self.value_param(value)?;
                Ok(format!("{expr} = {ph}"))
            }
            ObjectOpKind::PathContains(path, value) => {
                let pointer = with_path(path);
                let ph = self.value_param(value)?;
                Ok(self.flavor.array_element_match(&props, &pointer, &ph))
            }
            ObjectOpKind::PathIsNull(path) => {
                let pointer = with_path(path);
                Ok(format!(
                    "{} IS NULL",
                    self.flavor.json_scalar(&props, &pointer, None)
                ))
            }
            ObjectOpKind::PathIsNotNull(path) => {
                let pointer = with_path(path);
                Ok(format!(
                    "{} IS NOT NULL",
                    self.flavor.json_scalar(&props, &pointer, None)
                ))
            }
        }
    }

    // ---- trailing clauses ----

    fn emit_group_by(&mut self) -> Result<()> {
        if self.ast.grouping.keys.is_empty() {
            return Ok(());
        }
        self.push(" GROUP BY ");
        let keys = self.ast.grouping.keys.clone();
        for (index, key) in keys.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            let expr = self.field_expr(key, true)?;
            self.push(&expr);
        }
        Ok(())
    }

    fn emit_having(&mut self) -> Result<()> {
        let Some(having) = self.ast.grouping.having.clone() else {
            return Ok(());
        };
        let clause = self.lower_expression(&having)?;
        self.push(" HAVING ");
        self.push(&clause);
        Ok(())
    }

    fn emit_order_by(&mut self, vector: &Option<VectorPlan>) -> Result<()> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(plan) = vector.clone() {
            let expr = self.vector_source_expr(&plan)?;
            let vec_ph = self.vector_param(&plan);
            parts.push(format!(
                "{} ASC",
                self.flavor.vector_distance(&expr, &vec_ph, plan.metric)
            ));
        }
        let order_by = self.ast.order_by.clone();
        for spec in &order_by {
            let expr = self.field_expr(&spec.field, true)?;
            let direction = match spec.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            parts.push(format!("{expr} {direction}"));
        }
        if parts.is_empty() {
            return Ok(());
        }
        self.push(" ORDER BY ");
        self.push(&parts.join(", "));
        Ok(())
    }

    fn emit_limit(&mut self, vector: &Option<VectorPlan>) {
        let mut limit = self.ast.limit;
        if let Some(plan) = vector {
            limit = Some(match limit {
                Some(existing) => existing.min(plan.k),
                None => plan.k,
            });
        }
        match (limit, self.ast.offset) {
            (Some(limit), Some(offset)) => self.push(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => self.push(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => self.push(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
    }
}

fn comparison_token(op: ComparisonOp) -> Result<&'static str> {
    Ok(match op {
        ComparisonOp::Eq => "=",
        ComparisonOp::Neq => "<>",
        ComparisonOp::Gt => ">",
        ComparisonOp::Gte => ">=",
        ComparisonOp::Lt => "<",
        ComparisonOp::Lte => "<=",
        ComparisonOp::In | ComparisonOp::NotIn => {
            return Err(Error::unsupported_predicate(
                "IN comparisons lower through their own path",
            ));
        }
    })
}

/// Splits vector similarity leaves off an AND-chain expression.
///
/// Placement below OR/NOT was rejected at build time, so leaves are only
/// searched along top-level AND chains.
fn strip_vector_leaves(
    expression: PredicateExpression,
) -> (Vec<VectorPlan>, Option<PredicateExpression>) {
    match expression {
        PredicateExpression::VectorSimilarity {
            field,
            query,
            k,
            metric,
            min_score,
        } => (
            vec![VectorPlan {
                field,
                query,
                k,
                metric,
                min_score,
            }],
            None,
        ),
        PredicateExpression::And(children) => {
            let mut plans = Vec::new();
            let mut rest = Vec::new();
            for child in children {
                let (leaves, remainder) = strip_vector_leaves(child);
                plans.extend(leaves);
                if let Some(remainder) = remainder {
                    rest.push(remainder);
                }
            }
            let remainder = match rest.len() {
                0 => None,
                1 => Some(rest.into_iter().next().expect("one element")),
                _ => Some(PredicateExpression::And(rest)),
            };
            (plans, remainder)
        }
        other => (Vec::new(), Some(other)),
    }
}

/// Quotes an output column name, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes a string for embedding in a single-quoted SQL literal.
pub(crate) fn escape_sql_string(text: &str) -> String {
    text.replace('\'', "''")
}
