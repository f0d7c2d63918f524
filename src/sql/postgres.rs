//! Postgres dialect.
//!
//! Props are `jsonb` probed with `#>`/`#>>`, recursive path columns are
//! native arrays, and vector distance uses the pgvector operators. The
//! engine ships no Postgres driver; this dialect produces the SQL and bound
//! parameters for a caller-supplied backend.

use crate::error::Result;
use crate::query::ast::{QueryAst, VectorMetric};
use crate::schema::ValueType;
use crate::sql::lower::{self, escape_sql_string, SqlFlavor};
use crate::sql::set_ops::{self, SetOperationNode};
use crate::sql::{CompileOptions, CompiledSql, Dialect, SqlValue};
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn json_path(pointer: &[String]) -> String {
        let segments: Vec<String> = pointer
            .iter()
            .map(|segment| segment.replace(['{', '}', ','], "_"))
            .collect();
        format!("'{{{}}}'", escape_sql_string(&segments.join(",")))
    }

    fn vector_operator(metric: VectorMetric) -> &'static str {
        match metric {
            VectorMetric::Cosine => "<=>",
            VectorMetric::L2 => "<->",
            VectorMetric::InnerProduct => "<#>",
        }
    }
}

impl SqlFlavor for PostgresDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn json_scalar(
        &self,
        column_expr: &str,
        pointer: &[String],
        value_type: Option<ValueType>,
    ) -> String {
        let text = format!("({column_expr} #>> {})", Self::json_path(pointer));
        match value_type {
            Some(ValueType::Number) => format!("({text}::numeric)"),
            Some(ValueType::Boolean) => format!("({text}::boolean)"),
            _ => text,
        }
    }

    fn json_raw(&self, column_expr: &str, pointer: &[String]) -> String {
        if pointer.is_empty() {
            return column_expr.to_owned();
        }
        format!("({column_expr} #> {})", Self::json_path(pointer))
    }

    fn json_has_path(&self, column_expr: &str, pointer: &[String]) -> String {
        format!("{} IS NOT NULL", self.json_raw(column_expr, pointer))
    }

    fn json_array_length(&self, column_expr: &str, pointer: &[String]) -> String {
        format!("jsonb_array_length({})", self.json_raw(column_expr, pointer))
    }

    fn array_element_match(
        &self,
        column_expr: &str,
        pointer: &[String],
        placeholder: &str,
    ) -> String {
        format!(
            "{} @> to_jsonb({placeholder})",
            self.json_raw(column_expr, pointer)
        )
    }

    fn array_any_match(
        &self,
        column_expr: &str,
        pointer: &[String],
        placeholders: &[String],
    ) -> String {
        let target = self.json_raw(column_expr, pointer);
        let parts: Vec<String> = placeholders
            .iter()
            .map(|ph| format!("{target} @> to_jsonb({ph})"))
            .collect();
        format!("({})", parts.join(" OR "))
    }

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} ILIKE {placeholder}")
    }

    fn path_seed(&self, root_expr: &str, node_expr: &str) -> String {
        format!("ARRAY[{root_expr}, {node_expr}]")
    }

    fn path_step(&self, prev_expr: &str, node_expr: &str) -> String {
        format!("{prev_expr} || {node_expr}")
    }

    fn visited_seed(&self, root_expr: &str, node_expr: &str) -> String {
        format!("ARRAY[{root_expr}, {node_expr}]")
    }

    fn visited_step(&self, prev_expr: &str, node_expr: &str) -> String {
        format!("{prev_expr} || {node_expr}")
    }

    fn visited_excludes(&self, visited_expr: &str, node_expr: &str) -> String {
        format!("NOT ({node_expr} = ANY({visited_expr}))")
    }

    fn supports_vectors(&self) -> bool {
        true
    }

    fn vector_distance(&self, expr: &str, placeholder: &str, metric: VectorMetric) -> String {
        format!(
            "(({expr})::text::vector {} {placeholder}::vector)",
            Self::vector_operator(metric)
        )
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
            // `<#>` yields the negated inner product.
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
            Value::Bool(v) => SqlValue::Text(if *v { "true" } else { "false" }.to_owned()),
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

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
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
