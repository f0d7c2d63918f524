//! Construction-time validation: alias grammar, reserved identifiers,
//! vector-predicate placement, and recursion bounds.

use crate::error::{Error, Result};
use crate::query::ast::{PredicateExpression, RecursiveSpec};

/// Maximum alias length, including the first character.
pub const MAX_ALIAS_LEN: usize = 63;

/// Depth ceiling for variable-length traversals.
pub const MAX_RECURSIVE_DEPTH: u32 = 64;

/// Reserved SQL keywords that may not be used as aliases (case-insensitive).
pub const RESERVED_KEYWORDS: &[&str] = &[
    "select", "from", "where", "and", "or", "not", "in", "is", "null", "true", "false", "as",
    "on", "join", "left", "right", "inner", "outer", "cross", "full", "group", "by", "having",
    "order", "asc", "desc", "limit", "offset", "union", "intersect", "except", "all", "distinct",
    "case", "when", "then", "else", "end", "exists", "between", "like", "ilike", "insert",
    "update", "delete", "create", "drop", "alter", "table", "index", "view", "with", "recursive",
];

/// Checks the alias grammar: `^[A-Za-z_][A-Za-z0-9_]{0,62}$`, no reserved
/// keywords, no `cte_` prefix.
pub fn check_alias(alias: &str) -> Result<()> {
    let mut chars = alias.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || alias.len() > MAX_ALIAS_LEN {
        return Err(Error::validation_at(
            format!("alias '{alias}' must match [A-Za-z_][A-Za-z0-9_]{{0,62}}"),
            alias,
        ));
    }
    if alias.len() >= 4 && alias[..4].eq_ignore_ascii_case("cte_") {
        return Err(Error::validation_at(
            format!("alias '{alias}' must not begin with 'cte_'"),
            alias,
        ));
    }
    if RESERVED_KEYWORDS
        .iter()
        .any(|kw| alias.eq_ignore_ascii_case(kw))
    {
        return Err(Error::validation_at(
            format!("alias '{alias}' is a reserved SQL keyword"),
            alias,
        ));
    }
    Ok(())
}

/// Checks hop bounds for a variable-length traversal.
pub fn check_recursive_spec(spec: &RecursiveSpec) -> Result<()> {
    if spec.min_depth == 0 {
        return Err(Error::validation("minHops must be at least 1"));
    }
    if spec.max_depth >= 0 && (spec.min_depth as i64) > spec.max_depth as i64 {
        return Err(Error::validation(format!(
            "minHops {} exceeds maxHops {}",
            spec.min_depth, spec.max_depth
        )));
    }
    if spec.max_depth > MAX_RECURSIVE_DEPTH as i32 {
        return Err(Error::validation(format!(
            "maxHops {} exceeds the recursive depth ceiling {MAX_RECURSIVE_DEPTH}",
            spec.max_depth
        )));
    }
    Ok(())
}

/// Enforces the vector-predicate placement invariant.
///
/// A vector similarity leaf may sit at the top level or below a chain of
/// ANDs; it may not appear anywhere under OR or NOT.
pub fn check_vector_placement(expression: &PredicateExpression) -> Result<()> {
    walk_vector_placement(expression, true, "expression")
}

fn walk_vector_placement(
    expression: &PredicateExpression,
    and_chain: bool,
    path: &str,
) -> Result<()> {
    match expression {
        PredicateExpression::VectorSimilarity { .. } => {
            if and_chain {
                Ok(())
            } else {
                Err(Error::validation_at(
                    "vector similarity must not be nested under OR or NOT",
                    path,
                ))
            }
        }
        PredicateExpression::And(children) => {
            for (index, child) in children.iter().enumerate() {
                walk_vector_placement(child, and_chain, &format!("{path}.and[{index}]"))?;
            }
            Ok(())
        }
        PredicateExpression::Or(children) => {
            for (index, child) in children.iter().enumerate() {
                walk_vector_placement(child, false, &format!("{path}.or[{index}]"))?;
            }
            Ok(())
        }
        PredicateExpression::Not(child) => {
            walk_vector_placement(child, false, &format!("{path}.not"))
        }
        _ => Ok(()),
    }
}
