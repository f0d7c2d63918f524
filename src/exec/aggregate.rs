//! Aggregate query execution.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::exec::context::sql_to_value;
use crate::query::ast::QueryAst;
use crate::sql::{CompileOptions, CompiledSql};
use crate::value::Value;

/// A query whose projection is a caller-provided field/aggregate map.
///
/// Rows come back as objects keyed by the output names given to
/// `aggregate()`.
pub struct ExecutableAggregateQuery {
    core: Arc<EngineCore>,
    ast: QueryAst,
    compiled: Mutex<Option<Arc<CompiledSql>>>,
}

impl ExecutableAggregateQuery {
    pub(crate) fn new(core: Arc<EngineCore>, ast: QueryAst) -> Self {
        Self {
            core,
            ast,
            compiled: Mutex::new(None),
        }
    }

    pub fn execute(&self) -> Result<Vec<Value>> {
        if self.ast.has_params() {
            return Err(Error::validation("aggregate queries do not take parameters")
                .with_suggestion("bind literals before calling aggregate()"));
        }
        let compiled = self.compiled()?;
        let rows = self.core.backend.execute(&compiled)?;
        let outputs: Vec<&str> = self
            .ast
            .aggregate_projection
            .iter()
            .map(|output| output.output_name.as_str())
            .collect();
        let mut mapped = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = outputs.iter().map(|name| {
                let value = row
                    .get(name)
                    .map(|value| sql_to_value(value, None))
                    .unwrap_or(Value::Null);
                ((*name).to_owned(), value)
            });
            mapped.push(Value::Object(fields.collect()));
        }
        Ok(mapped)
    }

    fn compiled(&self) -> Result<Arc<CompiledSql>> {
        if let Some(compiled) = self.compiled.lock().clone() {
            return Ok(compiled);
        }
        let compiled = Arc::new(self.core.dialect.compile_query(
            &self.ast,
            &self.ast.graph_id,
            &CompileOptions::default(),
        )?);
        *self.compiled.lock() = Some(Arc::clone(&compiled));
        Ok(compiled)
    }
}
