//! Set-operation compilation: UNION / UNION ALL / INTERSECT / EXCEPT trees
//! over independently compiled leaf queries.

use crate::error::Result;
use crate::query::ast::QueryAst;
use crate::sql::lower::{self, SqlFlavor};
use crate::sql::{CompileOptions, CompiledSql, ParamSlot};

/// Set operator joining two compiled queries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn token(self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

/// Operand of a set operation: a leaf query or a nested operation.
#[derive(Clone, Debug)]
pub enum SetTree {
    Query(Box<QueryAst>),
    Op(Box<SetOperationNode>),
}

/// One binary set operation, with optional outer limit/offset.
#[derive(Clone, Debug)]
pub struct SetOperationNode {
    pub operator: SetOperator,
    pub left: SetTree,
    pub right: SetTree,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub(crate) fn compile(
    flavor: &dyn SqlFlavor,
    node: &SetOperationNode,
    graph_id: &str,
    options: &CompileOptions,
) -> Result<CompiledSql> {
    let mut compiler = SetCompiler {
        flavor,
        graph_id,
        namespace: options.cte_namespace.clone().unwrap_or_default(),
        member_count: 0,
        params: Vec::new(),
    };
    let sql = compiler.compile_node(node)?;
    Ok(CompiledSql {
        sql,
        params: compiler.params,
    })
}

struct SetCompiler<'a> {
    flavor: &'a dyn SqlFlavor,
    graph_id: &'a str,
    namespace: String,
    member_count: usize,
    params: Vec<ParamSlot>,
}

impl SetCompiler<'_> {
    fn compile_node(&mut self, node: &SetOperationNode) -> Result<String> {
        let left = self.compile_member(&node.left)?;
        let right = self.compile_member(&node.right)?;
        let mut sql = format!("{left} {} {right}", node.operator.token());
        match (node.limit, node.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok(sql)
    }

    /// Wraps each member as a subselect so leaf WITH clauses stay scoped.
    fn compile_member(&mut self, tree: &SetTree) -> Result<String> {
        self.member_count += 1;
        let member = self.member_count;
        match tree {
            SetTree::Query(ast) => {
                let namespace = format!("{}u{member}_", self.namespace);
                let compiled = lower::compile_query(
                    self.flavor,
                    ast,
                    self.graph_id,
                    &namespace,
                    self.params.len(),
                )?;
                self.params.extend(compiled.params);
                Ok(format!("SELECT * FROM ({}) AS u{member}", compiled.sql))
            }
            SetTree::Op(child) => {
                let child_sql = self.compile_node(child)?;
                Ok(format!("SELECT * FROM ({child_sql}) AS u{member}"))
            }
        }
    }
}
