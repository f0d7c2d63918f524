//! AST-to-SQL compilation: the dialect interface and compiled artifacts.

pub mod lower;
pub mod postgres;
pub mod set_ops;
pub mod sqlite;

use crate::error::Result;
use crate::query::ast::{QueryAst, VectorMetric};
use crate::value::Value;

pub use postgres::PostgresDialect;
pub use set_ops::{SetOperationNode, SetOperator, SetTree};
pub use sqlite::SqliteDialect;

/// One bound-parameter slot of a compiled statement.
///
/// Literal values are bound at compile time; named slots are filled by a
/// prepared query right before execution.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamSlot {
    Value(SqlValue),
    Param { name: String, string_op: bool },
}

/// Primitive value shipped to the backend driver.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

/// A compiled SQL statement plus its parameter slots, in placeholder order.
#[derive(Clone, Debug)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<ParamSlot>,
}

impl CompiledSql {
    /// True when every slot is a concrete value.
    pub fn is_fully_bound(&self) -> bool {
        self.params
            .iter()
            .all(|slot| matches!(slot, ParamSlot::Value(_)))
    }

    /// Concrete parameter values; fails on an unbound named slot.
    pub fn bound_params(&self) -> Result<Vec<SqlValue>> {
        self.params
            .iter()
            .map(|slot| match slot {
                ParamSlot::Value(value) => Ok(value.clone()),
                ParamSlot::Param { name, .. } => Err(crate::error::Error::configuration(
                    format!("parameter '{name}' was never bound"),
                )),
            })
            .collect()
    }
}

/// Compilation knobs; currently only present for interface stability.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Suffix distinguishing CTE names when several compiled queries are
    /// merged into one statement (set operations).
    pub cte_namespace: Option<String>,
}

/// A SQL dialect adapter: lowers ASTs and owns the vector primitives.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowers a query AST to a single SQL statement.
    fn compile_query(
        &self,
        ast: &QueryAst,
        graph_id: &str,
        options: &CompileOptions,
    ) -> Result<CompiledSql>;

    /// Lowers a set-operation tree over compiled leaves.
    fn compile_set_operation(
        &self,
        set_op: &SetOperationNode,
        graph_id: &str,
        options: &CompileOptions,
    ) -> Result<CompiledSql>;

    fn supports_vectors(&self) -> bool;

    /// Serializes an embedding vector into its bound-parameter form.
    fn format_embedding(&self, vector: &[f32]) -> SqlValue;

    /// Distance expression for a vector column against one placeholder.
    fn vector_distance(&self, column_expr: &str, placeholder: &str, metric: VectorMetric)
        -> String;

    /// Converts a host value into the dialect's bound-parameter form.
    fn bind_value(&self, value: &Value) -> Result<SqlValue>;
}
