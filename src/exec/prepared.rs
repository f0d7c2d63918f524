//! Prepared queries: compile once, validate bindings, execute many times.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::exec::context::SelectFn;
use crate::exec::executable::ExecutableQuery;
use crate::exec::mapping::map_results;
use crate::exec::selective::map_selective_results;
use crate::query::ast::{QueryAst, SelectiveField};
use crate::sql::{CompileOptions, CompiledSql, ParamSlot, SqlValue};
use crate::value::Value;

/// A query compiled ahead of time with named parameter slots.
///
/// Both the selective-optimized and full-blob forms are captured at
/// construction; per call, the selective form runs first and the full form
/// is the fallback for the two internal signals. Fallback state is not
/// remembered across calls, since different bindings may or may not trip it.
pub struct PreparedQuery {
    core: Arc<EngineCore>,
    ast: QueryAst,
    select_fn: SelectFn,
    full: Arc<CompiledSql>,
    selective: Option<(Arc<CompiledSql>, Arc<Vec<SelectiveField>>)>,
    param_names: BTreeSet<String>,
    string_op_params: BTreeSet<String>,
}

impl PreparedQuery {
    pub(crate) fn new(query: &ExecutableQuery) -> Result<Self> {
        let core = Arc::clone(query.core());
        let ast = query.ast().clone();
        let full = Arc::new(core.dialect.compile_query(
            &ast,
            &ast.graph_id,
            &CompileOptions::default(),
        )?);
        let selective = match query.selective_fields_for_execute() {
            Some(fields) => {
                let mut selective_ast = ast.clone();
                selective_ast.selective_fields = Some(fields.as_ref().clone());
                match core.dialect.compile_query(
                    &selective_ast,
                    &ast.graph_id,
                    &CompileOptions::default(),
                ) {
                    Ok(compiled) => Some((Arc::new(compiled), fields)),
                    Err(error) if error.is_fallback_signal() => {
                        warn!(
                            target: "grafo::prepared",
                            error = %error,
                            "selective form unavailable for prepared query"
                        );
                        None
                    }
                    Err(error) => return Err(error),
                }
            }
            None => None,
        };
        let param_names: BTreeSet<String> = ast.param_names().into_iter().collect();
        let string_op_params: BTreeSet<String> =
            ast.string_op_param_names().into_iter().collect();
        Ok(Self {
            core,
            ast,
            select_fn: Arc::clone(query.select_fn()),
            full,
            selective,
            param_names,
            string_op_params,
        })
    }

    /// The parameter names this query requires.
    pub fn param_names(&self) -> &BTreeSet<String> {
        &self.param_names
    }

    /// Runs with the given bindings, validating them first.
    pub fn execute(&self, bindings: &BTreeMap<String, Value>) -> Result<Vec<Value>> {
        self.validate_bindings(bindings)?;
        if let Some((compiled, fields)) = &self.selective {
            debug!(target: "grafo::prepared", "running selective form");
            match self.run_form(compiled, bindings, Some(fields)) {
                Ok(values) => return Ok(values),
                Err(error) if error.is_fallback_signal() => {
                    debug!(
                        target: "grafo::prepared",
                        error = %error,
                        "selective form fell back for this call"
                    );
                }
                Err(error) => return Err(error),
            }
        }
        self.run_form(&self.full, bindings, None)
    }

    fn validate_bindings(&self, bindings: &BTreeMap<String, Value>) -> Result<()> {
        let missing: Vec<String> = self
            .param_names
            .iter()
            .filter(|name| !bindings.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::configuration_with(
                format!("missing parameters: {}", missing.join(", ")),
                [("missingParameters".to_owned(), missing.join(","))],
            ));
        }
        let unexpected: Vec<String> = bindings
            .keys()
            .filter(|name| !self.param_names.contains(*name))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(Error::configuration_with(
                format!("unexpected parameters: {}", unexpected.join(", ")),
                [("unexpectedParameters".to_owned(), unexpected.join(","))],
            ));
        }
        for (name, value) in bindings {
            if value.is_null() {
                return Err(Error::configuration(format!(
                    "parameter '{name}' must not be null"
                ))
                .with_suggestion("model absent values with a dedicated query instead"));
            }
            if self.string_op_params.contains(name) && value.as_str().is_none() {
                return Err(Error::configuration(format!(
                    "parameter '{name}' feeds a string operation and must be a string"
                )));
            }
        }
        Ok(())
    }

    fn run_form(
        &self,
        compiled: &CompiledSql,
        bindings: &BTreeMap<String, Value>,
        selective: Option<&Arc<Vec<SelectiveField>>>,
    ) -> Result<Vec<Value>> {
        let rows = if self.core.backend.supports_raw() {
            let params = self.fill_slots(compiled, bindings)?;
            self.core.backend.execute_raw(&compiled.sql, &params)?
        } else {
            // Substitution fallback: inline the bindings and recompile.
            let mut ast = self.ast.clone();
            substitute(&mut ast, bindings);
            if let Some(fields) = selective {
                ast.selective_fields = Some(fields.as_ref().clone());
            }
            let recompiled = self.core.dialect.compile_query(
                &ast,
                &ast.graph_id,
                &CompileOptions::default(),
            )?;
            self.core.backend.execute(&recompiled)?
        };
        match selective {
            Some(fields) => map_selective_results(&self.ast, fields, &rows, &self.select_fn),
            None => map_results(&self.ast, &rows, &self.select_fn),
        }
    }

    /// Fills named slots from the bindings, converting through the dialect.
    fn fill_slots(
        &self,
        compiled: &CompiledSql,
        bindings: &BTreeMap<String, Value>,
    ) -> Result<Vec<SqlValue>> {
        compiled
            .params
            .iter()
            .map(|slot| match slot {
                ParamSlot::Value(value) => Ok(value.clone()),
                ParamSlot::Param { name, .. } => {
                    let value = bindings.get(name).ok_or_else(|| {
                        Error::configuration(format!("parameter '{name}' is unbound"))
                    })?;
                    self.core.dialect.bind_value(value)
                }
            })
            .collect()
    }
}

fn substitute(ast: &mut QueryAst, bindings: &BTreeMap<String, Value>) {
    let lookup = |name: &str| bindings.get(name).cloned();
    for predicate in &mut ast.predicates {
        predicate.expression.substitute_params(&lookup);
    }
    if let Some(having) = &mut ast.grouping.having {
        having.substitute_params(&lookup);
    }
}
