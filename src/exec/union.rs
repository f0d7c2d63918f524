//! Set-operation execution over compiled queries.

use std::sync::Arc;

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::exec::context::SelectFn;
use crate::exec::executable::ExecutableQuery;
use crate::exec::mapping::map_results;
use crate::query::ast::QueryAst;
use crate::sql::set_ops::{SetOperationNode, SetOperator, SetTree};
use crate::sql::CompileOptions;
use crate::value::Value;

/// A tree of set operations over compiled queries.
///
/// Result rows are mapped using the LEFT query's alias shape; composing
/// queries with diverging projections is unsupported.
pub struct UnionableQuery {
    core: Arc<EngineCore>,
    left_ast: QueryAst,
    select_fn: SelectFn,
    root: SetOperationNode,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl UnionableQuery {
    pub(crate) fn new(
        core: Arc<EngineCore>,
        left_ast: QueryAst,
        select_fn: SelectFn,
        root: SetOperationNode,
    ) -> Self {
        Self {
            core,
            left_ast,
            select_fn,
            root,
            limit: None,
            offset: None,
        }
    }

    pub(crate) fn into_root(self) -> SetOperationNode {
        self.root
    }

    fn extend(mut self, other: &ExecutableQuery, operator: SetOperator) -> Self {
        self.root = SetOperationNode {
            operator,
            left: SetTree::Op(Box::new(self.root)),
            right: SetTree::Query(Box::new(other.ast().clone())),
            limit: None,
            offset: None,
        };
        self
    }

    pub fn union(self, other: &ExecutableQuery) -> Self {
        self.extend(other, SetOperator::Union)
    }

    pub fn union_all(self, other: &ExecutableQuery) -> Self {
        self.extend(other, SetOperator::UnionAll)
    }

    pub fn intersect(self, other: &ExecutableQuery) -> Self {
        self.extend(other, SetOperator::Intersect)
    }

    pub fn except(self, other: &ExecutableQuery) -> Self {
        self.extend(other, SetOperator::Except)
    }

    /// Limit applied to the combined result.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Offset applied to the combined result.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn execute(&self) -> Result<Vec<Value>> {
        self.reject_params(&self.root)?;
        let mut root = self.root.clone();
        root.limit = self.limit;
        root.offset = self.offset;
        let compiled = self.core.dialect.compile_set_operation(
            &root,
            &self.left_ast.graph_id,
            &CompileOptions::default(),
        )?;
        let rows = self.core.backend.execute(&compiled)?;
        map_results(&self.left_ast, &rows, &self.select_fn)
    }

    fn reject_params(&self, node: &SetOperationNode) -> Result<()> {
        self.reject_tree_params(&node.left)?;
        self.reject_tree_params(&node.right)
    }

    fn reject_tree_params(&self, tree: &SetTree) -> Result<()> {
        match tree {
            SetTree::Query(ast) => {
                if ast.has_params() {
                    return Err(Error::validation(
                        "set operations over parameterized queries are not supported",
                    )
                    .with_suggestion("bind literals before composing set operations"));
                }
                Ok(())
            }
            SetTree::Op(node) => self.reject_params(node),
        }
    }
}
