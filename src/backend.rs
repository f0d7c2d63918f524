//! Backend interface and the bundled SQLite implementation.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sql::{CompiledSql, SqlValue};

/// One result row: ordered column names shared across the result set, plus
/// this row's values.
#[derive(Clone, Debug)]
pub struct SqlRow {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|index| &self.values[index])
    }

    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

/// Execution surface the engine drives.
///
/// Backend calls are the engine's only suspension points; everything else in
/// the pipeline is synchronous.
pub trait Backend: Send + Sync {
    /// Runs a fully bound compiled statement.
    fn execute(&self, compiled: &CompiledSql) -> Result<Vec<SqlRow>>;

    /// True when [`Backend::execute_raw`] is available as a fast path.
    fn supports_raw(&self) -> bool {
        false
    }

    /// Runs pre-compiled SQL text with concrete parameters.
    fn execute_raw(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let _ = (sql, params);
        Err(Error::configuration(
            "backend does not support pre-compiled execution",
        ))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// rusqlite-backed store with the vector distance functions registered.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|err| Error::backend("failed to open database", err))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| Error::backend("failed to set journal mode", err))?;
        Self::from_connection(conn)
    }

    /// Opens a transient in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| Error::backend("failed to open in-memory database", err))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_vector_functions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a batch of semicolon-separated statements (DDL, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|err| Error::backend("batch execution failed", err))
    }

    fn run(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        debug!(target: "grafo::backend", sql, params = params.len(), "executing statement");
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|err| Error::backend("failed to prepare statement", err))?;
        let columns: Arc<Vec<String>> = Arc::new(
            stmt.column_names()
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
        );
        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_driver_value).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound))
            .map_err(|err| Error::backend("query failed", err))?;
        let mut out = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(err) => return Err(Error::backend("row fetch failed", err)),
            };
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value: rusqlite::types::Value = row
                    .get(index)
                    .map_err(|err| Error::backend("column read failed", err))?;
                values.push(from_driver_value(value));
            }
            out.push(SqlRow::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }
}

impl Backend for SqliteBackend {
    fn execute(&self, compiled: &CompiledSql) -> Result<Vec<SqlRow>> {
        let params = compiled.bound_params()?;
        self.run(&compiled.sql, &params)
    }

    fn supports_raw(&self) -> bool {
        true
    }

    fn execute_raw(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.run(sql, params)
    }
}

fn to_driver_value(value: &SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(v) => rusqlite::types::Value::Integer(*v),
        SqlValue::Real(v) => rusqlite::types::Value::Real(*v),
        SqlValue::Text(v) => rusqlite::types::Value::Text(v.clone()),
        SqlValue::Blob(v) => rusqlite::types::Value::Blob(v.clone()),
    }
}

fn from_driver_value(value: rusqlite::types::Value) -> SqlValue {
    match value {
        rusqlite::types::Value::Null => SqlValue::Null,
        rusqlite::types::Value::Integer(v) => SqlValue::Integer(v),
        rusqlite::types::Value::Real(v) => SqlValue::Real(v),
        rusqlite::types::Value::Text(v) => SqlValue::Text(v),
        rusqlite::types::Value::Blob(v) => SqlValue::Blob(v),
    }
}

fn parse_vector(text: &str) -> Option<Vec<f64>> {
    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    let items = json.as_array()?;
    items.iter().map(serde_json::Value::as_f64).collect()
}

fn register_vector_functions(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("grafo_vec_cosine", 2, flags, |ctx| {
        Ok(vector_args(ctx).map(|(a, b)| {
            let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }))
    })
    .map_err(|err| Error::backend("failed to register grafo_vec_cosine", err))?;

    conn.create_scalar_function("grafo_vec_l2", 2, flags, |ctx| {
        Ok(vector_args(ctx).map(|(a, b)| {
            a.iter()
                .zip(&b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt()
        }))
    })
    .map_err(|err| Error::backend("failed to register grafo_vec_l2", err))?;

    // Returns the negated inner product so smaller is always nearer.
    conn.create_scalar_function("grafo_vec_inner", 2, flags, |ctx| {
        Ok(vector_args(ctx)
            .map(|(a, b)| -(a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>())))
    })
    .map_err(|err| Error::backend("failed to register grafo_vec_inner", err))?;

    Ok(())
}

fn vector_args(ctx: &rusqlite::functions::Context<'_>) -> Option<(Vec<f64>, Vec<f64>)> {
    let a = ctx.get::<Option<String>>(0).ok()??;
    let b = ctx.get::<Option<String>>(1).ok()??;
    let a = parse_vector(&a)?;
    let b = parse_vector(&b)?;
    if a.len() != b.len() {
        return None;
    }
    Some((a, b))
}
