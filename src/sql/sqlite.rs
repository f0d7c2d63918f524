//! SQLite dialect.
//!
//! Props are JSON text probed with `json_extract`/`json_each`; recursive
//! path columns are `|`-joined id strings; vector distance goes through the
//! `grafo_vec_*` scalar functions registered by the SQLite backend.

use crate::error::Result;
use crate::query::ast::{QueryAst, VectorMetric};
use crate::schema::ValueType;
use crate::sql::lower::{self, escape_sql_string, SqlFlavor};
use crate::sql::set_ops::{self, SetOperationNode};
use crate::sql::{CompileOptions, CompiledSql, Dialect, SqlValue};
use crate::value::Value;

/// Separator used in recursive path columns before normalization.
pub const PATH_SEPARATOR: char = '|';

/// Registered scalar function names, one per metric.
pub fn vector_function(metric: VectorMetric) -> &'static str {
    match metric {
        VectorMetric::Cosine => "grafo_vec_cosine",
        VectorMetric::L2 => "grafo_vec_l2",
        VectorMetric::InnerProduct => "grafo_vec_inner",
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }

    fn json_path(pointer: &[String]) -> String {
        let mut path = String::from("$");
        for segment in pointer {
            let simple = segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if simple && !segment.is_empty() {
                path.push('.');
                path.push_str(segment);
            } else {
                path.push_str(".\"");
                path.push_str(&segment.replace('"', ""));
                path.push('"');
            }
        }
        format!("'{}'", escape_sql_string(&path))
    }
}

impl SqlFlavor for SqliteDialect {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_owned()
    }

    fn json_scalar(
        &self,
        column_expr: &str,
        pointer: &[String],
        _value_type: Option<ValueType>,
    ) -> String {
        format!(
            "json_extract({column_expr}, {})",
            Self::json_path(pointer)
        )
    }

    fn json_raw(&self, column_expr: &str, pointer: &[String]) -> String {
        if pointer.is_empty() {
            return column_expr.to_owned();
        }
        format!(
            "json_extract({column_expr}, {})",
            Self::json_path(pointer)
        )
    }

    fn json_has_path(&self, column_expr: &str, pointer: &[String]) -> String {
        format!(
            "json_type({column_expr}, {}) IS NOT NULL",
            Self::json_path(pointer)
        )
    }

    fn json_array_length(&self, column_expr: &str, pointer: &[String]) -> String {
        format!(
            "json_array_length({column_expr}, {})",
            Self::json_path(pointer)
        )
    }

    fn array_element_match(
        &self,
        column_expr: &str,
        pointer: &[String],
        placeholder: &str,
    ) -> String {
        format!(
            "EXISTS (SELECT 1 FROM json_each({column_expr}, {}) WHERE json_each.value = {placeholder})",
            Self::json_path(pointer)
        )
    }

    fn array_any_match(
        &self,
        column_expr: &str,
        pointer: &[String],
        placeholders: &[String],
    ) -> String {
        format!(
            "EXISTS (SELECT 1 FROM json_each({column_expr}, {}) WHERE json_each.value IN ({}))",
            Self::json_path(pointer),
            placeholders.join(", ")
        )
    }

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String {
        format!("lower({expr}) LIKE lower({placeholder})")
    }

    fn path_seed(&self, root_expr: &str, node_expr: &str) -> String {
        format!("{root_expr} || '{PATH_SEPARATOR}' || {node_expr}")
    }

    fn path_step(&self, prev_expr: &str, node_expr: &str) -> String {
        format!("{prev_expr} || '{PATH_SEPARATOR}' || {node_expr}")
    }

    fn visited_seed(&self, root_expr: &str, node_expr: &str) -> String {
        format!("',' || {root_expr} || ',' || {node_expr} || ','")
    }

    fn visited_step(&self, prev_expr: &str, node_expr: &str) -> String {
        format!("{prev_expr} || {node_expr} || ','")
    }

    fn visited_excludes(&self, visited_expr: &str, node_expr: &str) -> String {
        format!("instr({visited_expr}, ',' || {node_expr} || ',') = 0")
    }

    fn supports_vectors(&self) -> bool {
        true
    }

    fn vector_distance(&self, expr: &str, placeholder: &str, metric: VectorMetric) -> String {
        format!("{}({expr}, {placeholder})", vector_function(metric))
    }

    fn vector_min_score(
        &self,
        expr: &str,
        vec_ph: &str,
        score_ph: &str,
        metric: VectorMetric,
    ) -> String {
        let distance = SqlFlavor::vector_distance(self, expr, vec_ph, metric);
        match metric {
            VectorMetric::Cosine => format!("(1.0 - {distance}) >= {score_ph}"),
            VectorMetric::L2 => format!("{distance} <= {score_ph}"),
            // The registered function returns the negated inner product.
            VectorMetric::InnerProduct => format!("(0.0 - {distance}) >= {score_ph}"),
        }
    }

    fn format_embedding(&self, vector: &[f32]) -> SqlValue {
        let parts: Vec<String> = vector.iter().map(|v| format!("{v}")).collect();
        SqlValue::Text(format!("[{}]", parts.join(",")))
    }

    fn bind_value(&self, value: &Value) -> Result<SqlValue> {
        Ok(match value {
            Value::Null => SqlValue::Null,
            Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
            Value::Int(v) => SqlValue::Integer(*v),
            Value::Float(v) => SqlValue::Real(*v),
            Value::String(v) => SqlValue::Text(v.clone()),
            Value::Date(_) | Value::Array(_) | Value::Object(_) => {
                let json = value.to_json();
                match json {
                    serde_json::Value::String(text) => SqlValue::Text(text),
                    other => SqlValue::Text(other.to_string()),
                }
            }
        })
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn compile_query(
        &self,
        ast: &QueryAst,
        graph_id: &str,
        options: &CompileOptions,
    ) -> Result<CompiledSql> {
        let namespace = options.cte_namespace.as_deref().unwrap_or("");
        lower::compile_query(self, ast, graph_id, namespace, 0)
    }

    fn compile_set_operation(
        &self,
        set_op: &SetOperationNode,
        graph_id: &str,
        options: &CompileOptions,
    ) -> Result<CompiledSql> {
        set_ops::compile(self, set_op, graph_id, options)
    }

    fn supports_vectors(&self) -> bool {
        SqlFlavor::supports_vectors(self)
    }

    fn format_embedding(&self, vector: &[f32]) -> SqlValue {
        SqlFlavor::format_embedding(self, vector)
    }

    fn vector_distance(
        &self,
        column_expr: &str,
        placeholder: &str,
        metric: VectorMetric,
    ) -> String {
        SqlFlavor::vector_distance(self, column_expr, placeholder, metric)
    }

    fn bind_value(&self, value: &Value) -> Result<SqlValue> {
        SqlFlavor::bind_value(self, value)
    }
}
