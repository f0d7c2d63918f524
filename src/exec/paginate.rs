//! Keyset cursor pagination.
//!
//! Pages are fetched with a limit+1 sentinel row; page boundaries round-trip
//! through opaque cursors whose values come from dedicated ORDER BY output
//! columns, so cursor extraction never depends on the projection shape.

use tracing::debug;

use crate::backend::SqlRow;
use crate::error::{Error, Result};
use crate::exec::executable::ExecutableQuery;
use crate::exec::mapping::map_results;
use crate::exec::selective::map_selective_results;
use crate::query::ast::{
    ComparisonOp, NodePredicate, OrderSpec, PredicateExpression, QueryAst, SortDirection,
    TargetType,
};
use crate::query::cursor::{CursorData, CursorDirection};
use crate::sql::{CompileOptions, SqlValue};
use crate::value::{Operand, Value};

/// Default page size when neither `first` nor `last` is given.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Pagination arguments: forward (`first`/`after`) or backward
/// (`last`/`before`).
#[derive(Clone, Debug, Default)]
pub struct PageArgs {
    pub first: Option<u64>,
    pub after: Option<String>,
    pub last: Option<u64>,
    pub before: Option<String>,
}

impl PageArgs {
    pub fn first(count: u64) -> Self {
        Self {
            first: Some(count),
            ..Self::default()
        }
    }

    pub fn first_after(count: u64, cursor: impl Into<String>) -> Self {
        Self {
            first: Some(count),
            after: Some(cursor.into()),
            ..Self::default()
        }
    }

    pub fn last(count: u64) -> Self {
        Self {
            last: Some(count),
            ..Self::default()
        }
    }

    pub fn last_before(count: u64, cursor: impl Into<String>) -> Self {
        Self {
            last: Some(count),
            before: Some(cursor.into()),
            ..Self::default()
        }
    }
}

/// One page of results plus its boundary cursors.
#[derive(Clone, Debug)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

pub(crate) fn paginate(query: &ExecutableQuery, args: PageArgs) -> Result<Page> {
    let ast = query.ast();
    if ast.order_by.is_empty() {
        return Err(Error::validation_at(
            "paginate requires a non-empty orderBy",
            "orderBy",
        )
        .with_suggestion("add order_by(alias, field, direction) before paginating"));
    }
    let forward_args = args.first.is_some() || args.after.is_some();
    let backward_args = args.last.is_some() || args.before.is_some();
    if forward_args && backward_args {
        return Err(Error::validation(
            "paginate accepts either first/after or last/before, not both",
        ));
    }
    let backward = backward_args;
    let limit = args.first.or(args.last).unwrap_or(DEFAULT_PAGE_SIZE);
    let fetch_limit = limit + 1;

    let column_ids: Vec<String> = ast
        .order_by
        .iter()
        .map(|spec| spec.field.column_id())
        .collect();

    let cursor = match (&args.after, &args.before) {
        (Some(encoded), _) | (_, Some(encoded)) => {
            let data = CursorData::decode(encoded)?;
            data.validate_columns(&column_ids)?;
            Some(data)
        }
        _ => None,
    };

    // Effective query: directions swapped for backward pages, keyset
    // predicate appended, limit+1 sentinel.
    let mut effective = ast.clone();
    if backward {
        for spec in &mut effective.order_by {
            spec.direction = spec.direction.reversed();
        }
    }
    if let Some(cursor) = &cursor {
        let predicate = cursor_predicate(&effective.order_by, cursor);
        if let Some(expression) = predicate {
            effective.predicates.push(NodePredicate {
                target_alias: effective.start.alias.clone(),
                target_type: TargetType::Node,
                expression,
            });
        }
    }
    effective.limit = Some(fetch_limit);
    effective.offset = None;

    debug!(
        target: "grafo::paginate",
        limit,
        backward,
        has_cursor = cursor.is_some(),
        "fetching page"
    );
    let (rows, items) = fetch_and_map(query, &effective)?;

    let has_more = rows.len() as u64 > limit;
    let mut rows: Vec<SqlRow> = rows.into_iter().take(limit as usize).collect();
    let mut items: Vec<Value> = items.into_iter().take(limit as usize).collect();
    if backward {
        rows.reverse();
        items.reverse();
    }

    let first_cursor = rows
        .first()
        .map(|row| boundary_cursor(row, &column_ids, CursorDirection::Backward));
    let last_cursor = rows
        .last()
        .map(|row| boundary_cursor(row, &column_ids, CursorDirection::Forward));

    let (has_next_page, has_prev_page, next_cursor, prev_cursor) = if backward {
        let has_prev = has_more;
        let has_next = args.before.is_some();
        (
            has_next,
            has_prev,
            if has_next { last_cursor } else { None },
            if has_prev { first_cursor } else { None },
        )
    } else {
        let has_next = has_more;
        let has_prev = args.after.is_some();
        (
            has_next,
            has_prev,
            if has_next { last_cursor } else { None },
            if has_prev { first_cursor } else { None },
        )
    };

    Ok(Page {
        items,
        next_cursor,
        prev_cursor,
        has_next_page,
        has_prev_page,
    })
}

/// Runs the effective query, preferring the selective plan when eligible.
fn fetch_and_map(
    query: &ExecutableQuery,
    effective: &QueryAst,
) -> Result<(Vec<SqlRow>, Vec<Value>)> {
    let core = query.core();
    if !query.optimized_is_disabled() {
        if let Some(fields) = query.selective_fields_for_pagination() {
            let mut selective_ast = effective.clone();
            selective_ast.selective_fields = Some(fields.as_ref().clone());
            let attempt = core
                .dialect
                .compile_query(
                    &selective_ast,
                    &effective.graph_id,
                    &CompileOptions::default(),
                )
                .and_then(|compiled| core.backend.execute(&compiled))
                .and_then(|rows| {
                    map_selective_results(effective, &fields, &rows, query.select_fn())
                        .map(|items| (rows, items))
                });
            match attempt {
                Ok(result) => return Ok(result),
                Err(error) if error.is_fallback_signal() => {
                    query.disable_optimized();
                }
                Err(error) => return Err(error),
            }
        }
    }
    let compiled = core.dialect.compile_query(
        effective,
        &effective.graph_id,
        &CompileOptions::default(),
    )?;
    let rows = core.backend.execute(&compiled)?;
    let items = map_results(effective, &rows, query.select_fn())?;
    Ok((rows, items))
}

/// Builds the row-wise keyset predicate for the effective order specs.
///
/// For columns `c1..cn` the predicate is the disjunction over i of
/// `(c1 = v1) AND .. AND (c_{i-1} = v_{i-1}) AND (c_i > v_i)`, with the
/// comparison operator flipped for descending columns. NULL cursor values
/// turn equalities into IS NULL and comparisons into IS NOT NULL.
fn cursor_predicate(
    order_by: &[OrderSpec],
    cursor: &CursorData,
) -> Option<PredicateExpression> {
    let mut disjuncts: Vec<PredicateExpression> = Vec::new();
    for boundary in 0..order_by.len() {
        let mut conjuncts: Vec<PredicateExpression> = Vec::new();
        for (index, spec) in order_by.iter().take(boundary + 1).enumerate() {
            let value = cursor.vals.get(index)?;
            let is_boundary = index == boundary;
            if value.is_null() {
                conjuncts.push(PredicateExpression::NullCheck {
                    field: spec.field.clone(),
                    negated: is_boundary,
                });
                continue;
            }
            let literal =
                Value::from_json_typed(value, spec.field.value_type);
            if is_boundary {
                let op = match spec.direction {
                    SortDirection::Asc => ComparisonOp::Gt,
                    SortDirection::Desc => ComparisonOp::Lt,
                };
                conjuncts.push(PredicateExpression::Comparison {
                    field: spec.field.clone(),
                    op,
                    value: Operand::Literal(literal),
                });
            } else {
                conjuncts.push(PredicateExpression::Comparison {
                    field: spec.field.clone(),
                    op: ComparisonOp::Eq,
                    value: Operand::Literal(literal),
                });
            }
        }
        disjuncts.push(if conjuncts.len() == 1 {
            conjuncts.into_iter().next().expect("one conjunct")
        } else {
            PredicateExpression::And(conjuncts)
        });
    }
    match disjuncts.len() {
        0 => None,
        1 => Some(disjuncts.into_iter().next().expect("one disjunct")),
        _ => Some(PredicateExpression::Or(disjuncts)),
    }
}

/// Builds a boundary cursor from a row's ORDER BY output columns.
fn boundary_cursor(row: &SqlRow, column_ids: &[String], direction: CursorDirection) -> String {
    let vals: Vec<serde_json::Value> = (0..column_ids.len())
        .map(|index| {
            row.get(&format!("ob_{index}"))
                .map(sql_to_json)
                .unwrap_or(serde_json::Value::Null)
        })
        .collect();
    CursorData::new(direction, vals, column_ids.to_vec()).encode()
}

fn sql_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(v) => serde_json::Value::from(*v),
        SqlValue::Real(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(v) => serde_json::Value::String(v.clone()),
        SqlValue::Blob(_) => serde_json::Value::Null,
    }
}
