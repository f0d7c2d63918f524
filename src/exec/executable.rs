//! Executable queries: lazy compilation caches and two-path execution.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::exec::context::SelectFn;
use crate::exec::paginate::{paginate, PageArgs, Page};
use crate::exec::prepared::PreparedQuery;
use crate::exec::selective::{
    build_selective_fields, map_selective_results, run_tracking_passes,
};
use crate::exec::stream::QueryStream;
use crate::exec::union::UnionableQuery;
use crate::exec::mapping::map_results;
use crate::query::ast::{QueryAst, SelectiveField};
use crate::sql::set_ops::{SetOperationNode, SetOperator, SetTree};
use crate::sql::{CompileOptions, CompiledSql};
use crate::value::Value;

#[derive(Default)]
struct ExecCaches {
    compiled: Option<Arc<CompiledSql>>,
    optimized_compiled: Option<Arc<CompiledSql>>,
    /// Outer `None` = not yet computed; inner `None` = optimization off.
    selective_for_execute: Option<Option<Arc<Vec<SelectiveField>>>>,
    selective_for_pagination: Option<Option<Arc<Vec<SelectiveField>>>>,
    /// Set after a fallback signal; later calls skip the optimized attempt.
    optimized_disabled: bool,
}

/// A fully built query plus its select callback.
///
/// Compiled SQL and selective plans are computed on first use and cached per
/// instance. The caches are not shared across clones and not synchronized
/// beyond a mutex; callers sharing one instance across tasks serialize on it.
pub struct ExecutableQuery {
    core: Arc<EngineCore>,
    ast: QueryAst,
    select_fn: SelectFn,
    caches: Mutex<ExecCaches>,
}

/// Compiled statement summary returned by [`ExecutableQuery::explain`].
#[derive(Clone, Debug)]
pub struct QueryExplain {
    pub dialect: &'static str,
    pub sql: String,
    pub param_count: usize,
    /// SQL of the selective form, when the tracking passes produced one.
    pub optimized_sql: Option<String>,
}

impl ExecutableQuery {
    pub(crate) fn new(core: Arc<EngineCore>, ast: QueryAst, select_fn: SelectFn) -> Self {
        Self {
            core,
            ast,
            select_fn,
            caches: Mutex::new(ExecCaches::default()),
        }
    }

    pub(crate) fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    pub(crate) fn ast(&self) -> &QueryAst {
        &self.ast
    }

    pub(crate) fn select_fn(&self) -> &SelectFn {
        &self.select_fn
    }

    fn reject_params(&self) -> Result<()> {
        if self.ast.has_params() {
            return Err(Error::validation(
                "query references named parameters",
            )
            .with_suggestion("use prepare() and execute(bindings) instead of execute()"));
        }
        Ok(())
    }

    /// Runs the query and maps rows through the select callback.
    ///
    /// The optimized selective path is attempted first; the full-blob path
    /// is the fallback for the two internal signals.
    pub fn execute(&self) -> Result<Vec<Value>> {
        self.reject_params()?;
        if let Some(result) = self.try_execute_optimized()? {
            return Ok(result);
        }
        self.execute_full()
    }

    /// Attempts the selective path; `Ok(None)` means "use the fallback".
    fn try_execute_optimized(&self) -> Result<Option<Vec<Value>>> {
        if self.caches.lock().optimized_disabled {
            return Ok(None);
        }
        let Some(fields) = self.selective_fields_for_execute() else {
            return Ok(None);
        };
        let compiled = {
            let cached = self.caches.lock().optimized_compiled.clone();
            match cached {
                Some(compiled) => compiled,
                None => {
                    let mut ast = self.ast.clone();
                    ast.selective_fields = Some(fields.as_ref().clone());
                    match self.core.dialect.compile_query(
                        &ast,
                        &self.ast.graph_id,
                        &CompileOptions::default(),
                    ) {
                        Ok(compiled) => {
                            let compiled = Arc::new(compiled);
                            self.caches.lock().optimized_compiled =
                                Some(Arc::clone(&compiled));
                            compiled
                        }
                        Err(error) if error.is_fallback_signal() => {
                            warn!(
                                target: "grafo::exec",
                                error = %error,
                                "selective compile failed, disabling optimized path"
                            );
                            self.caches.lock().optimized_disabled = true;
                            return Ok(None);
                        }
                        Err(error) => return Err(error),
                    }
                }
            }
        };
        debug!(target: "grafo::exec", "executing selective form");
        let rows = self.core.backend.execute(&compiled)?;
        match map_selective_results(&self.ast, &fields, &rows, &self.select_fn) {
            Ok(values) => Ok(Some(values)),
            Err(error) if error.is_fallback_signal() => {
                warn!(
                    target: "grafo::exec",
                    error = %error,
                    "selective mapping failed, disabling optimized path"
                );
                self.caches.lock().optimized_disabled = true;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn execute_full(&self) -> Result<Vec<Value>> {
        let compiled = self.compiled_full()?;
        debug!(target: "grafo::exec", "executing full-blob form");
        let rows = self.core.backend.execute(&compiled)?;
        map_results(&self.ast, &rows, &self.select_fn)
    }

    pub(crate) fn compiled_full(&self) -> Result<Arc<CompiledSql>> {
        if let Some(compiled) = self.caches.lock().compiled.clone() {
            return Ok(compiled);
        }
        let compiled = Arc::new(self.core.dialect.compile_query(
            &self.ast,
            &self.ast.graph_id,
            &CompileOptions::default(),
        )?);
        self.caches.lock().compiled = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Selective plan for plain execution, memoized per instance.
    pub(crate) fn selective_fields_for_execute(&self) -> Option<Arc<Vec<SelectiveField>>> {
        if let Some(cached) = self.caches.lock().selective_for_execute.clone() {
            return cached;
        }
        let outcome = run_tracking_passes(&self.ast, &self.select_fn, &self.core.introspector);
        let fields = build_selective_fields(&self.ast, &outcome, &self.core.introspector)
            .map(|fields| Arc::new(fields));
        self.caches.lock().selective_for_execute = Some(fields.clone());
        fields
    }

    /// Selective plan for pagination; additionally requires every ORDER BY
    /// field to be a single-segment property.
    pub(crate) fn selective_fields_for_pagination(&self) -> Option<Arc<Vec<SelectiveField>>> {
        if let Some(cached) = self.caches.lock().selective_for_pagination.clone() {
            return cached;
        }
        let eligible = self.ast.order_by.iter().all(|spec| {
            spec.field.path == crate::query::ast::FieldPath::Props
                && spec.field.json_pointer.len() == 1
        });
        let fields = if eligible {
            self.selective_fields_for_execute()
        } else {
            None
        };
        self.caches.lock().selective_for_pagination = Some(fields.clone());
        fields
    }

    pub(crate) fn optimized_is_disabled(&self) -> bool {
        self.caches.lock().optimized_disabled
    }

    pub(crate) fn disable_optimized(&self) {
        self.caches.lock().optimized_disabled = true;
    }

    /// Keyset pagination over this query.
    pub fn paginate(&self, args: PageArgs) -> Result<Page> {
        self.reject_params()?;
        paginate(self, args)
    }

    /// Batched streaming over this query; pulls pages lazily.
    pub fn stream(&self, batch_size: u64) -> Result<QueryStream<'_>> {
        self.reject_params()?;
        QueryStream::new(self, batch_size)
    }

    /// Compiles both execution forms once for repeated parameterized runs.
    pub fn prepare(&self) -> Result<PreparedQuery> {
        PreparedQuery::new(self)
    }

    /// Compiled SQL summary without executing.
    pub fn explain(&self) -> Result<QueryExplain> {
        let compiled = self.compiled_full()?;
        let optimized_sql = self.selective_fields_for_execute().and_then(|fields| {
            let mut ast = self.ast.clone();
            ast.selective_fields = Some(fields.as_ref().clone());
            self.core
                .dialect
                .compile_query(&ast, &self.ast.graph_id, &CompileOptions::default())
                .ok()
                .map(|compiled| compiled.sql)
        });
        Ok(QueryExplain {
            dialect: self.core.dialect.name(),
            sql: compiled.sql.clone(),
            param_count: compiled.params.len(),
            optimized_sql,
        })
    }

    /// Row count of the full result set.
    pub fn count(&self) -> Result<u64> {
        self.reject_params()?;
        let compiled = self.compiled_full()?;
        let wrapped = CompiledSql {
            sql: format!("SELECT COUNT(*) AS n FROM ({}) AS sub", compiled.sql),
            params: compiled.params.clone(),
        };
        let rows = self.core.backend.execute(&wrapped)?;
        let count = rows
            .first()
            .and_then(|row| row.get("n"))
            .and_then(|value| value.as_integer())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// First row of the result, if any.
    pub fn first(&self) -> Result<Option<Value>> {
        self.reject_params()?;
        let mut ast = self.ast.clone();
        ast.limit = Some(1);
        let limited = ExecutableQuery::new(
            Arc::clone(&self.core),
            ast,
            Arc::clone(&self.select_fn),
        );
        Ok(limited.execute()?.into_iter().next())
    }

    fn combine(&self, other: &ExecutableQuery, operator: SetOperator) -> UnionableQuery {
        UnionableQuery::new(
            Arc::clone(&self.core),
            self.ast.clone(),
            Arc::clone(&self.select_fn),
            SetOperationNode {
                operator,
                left: SetTree::Query(Box::new(self.ast.clone())),
                right: SetTree::Query(Box::new(other.ast.clone())),
                limit: None,
                offset: None,
            },
        )
    }

    /// Set union (distinct rows) with another query.
    pub fn union(&self, other: &ExecutableQuery) -> UnionableQuery {
        self.combine(other, SetOperator::Union)
    }

    /// Set union with an already-composed operation tree on the right.
    pub fn union_tree(&self, other: UnionableQuery) -> UnionableQuery {
        UnionableQuery::new(
            Arc::clone(&self.core),
            self.ast.clone(),
            Arc::clone(&self.select_fn),
            SetOperationNode {
                operator: SetOperator::Union,
                left: SetTree::Query(Box::new(self.ast.clone())),
                right: SetTree::Op(Box::new(other.into_root())),
                limit: None,
                offset: None,
            },
        )
    }

    /// Multiset union with another query.
    pub fn union_all(&self, other: &ExecutableQuery) -> UnionableQuery {
        self.combine(other, SetOperator::UnionAll)
    }

    pub fn intersect(&self, other: &ExecutableQuery) -> UnionableQuery {
        self.combine(other, SetOperator::Intersect)
    }

    pub fn except(&self, other: &ExecutableQuery) -> UnionableQuery {
        self.combine(other, SetOperator::Except)
    }
}
