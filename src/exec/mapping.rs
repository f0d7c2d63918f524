//! Full-blob result mapping: backend rows to caller values.

use std::collections::BTreeMap;

use crate::backend::SqlRow;
use crate::error::Result;
use crate::exec::context::{EntityData, MetaData, RowBundle, SelectContext, SelectFn};
use crate::query::ast::QueryAst;
use crate::sql::sqlite::PATH_SEPARATOR;
use crate::sql::SqlValue;
use crate::value::Value;

/// Maps every row through the select callback, preserving backend order.
pub(crate) fn map_results(
    ast: &QueryAst,
    rows: &[SqlRow],
    select_fn: &SelectFn,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let bundle = build_row_bundle(ast, row);
        let context = SelectContext::real(&bundle);
        out.push(select_fn(&context));
    }
    Ok(out)
}

/// Builds the per-row alias map consumed by the select context.
pub(crate) fn build_row_bundle(ast: &QueryAst, row: &SqlRow) -> RowBundle {
    let mut bundle = RowBundle::default();
    insert_entity(&mut bundle, row, &ast.start.alias, false);
    for traversal in &ast.traversals {
        insert_entity(&mut bundle, row, &traversal.edge_alias, true);
        insert_entity(&mut bundle, row, &traversal.node_alias, false);
        if let Some(spec) = &traversal.variable_length {
            if let Some(depth_alias) = &spec.depth_alias {
                let value = row
                    .get(depth_alias)
                    .map(|v| super::context::sql_to_value(v, None))
                    .unwrap_or(Value::Null);
                bundle.extra.insert(depth_alias.clone(), value);
            }
            if let Some(path_alias) = &spec.path_alias {
                let value = row
                    .get(path_alias)
                    .map(normalize_path_value)
                    .unwrap_or(Value::Null);
                bundle.extra.insert(path_alias.clone(), value);
            }
        }
    }
    bundle
}

fn insert_entity(bundle: &mut RowBundle, row: &SqlRow, alias: &str, is_edge: bool) {
    let id = match row.get(&format!("{alias}__id")) {
        Some(SqlValue::Text(id)) => id.clone(),
        // NULL id means the optional traversal did not match this row.
        _ => return,
    };
    let kind = match row.get(&format!("{alias}__kind")) {
        Some(SqlValue::Text(kind)) => kind.clone(),
        _ => String::new(),
    };
    let props = match row.get(&format!("{alias}__props")) {
        Some(SqlValue::Text(json)) => decode_props(json),
        _ => BTreeMap::new(),
    };
    let text_column = |column: &str| -> Value {
        match row.get(&format!("{alias}__{column}")) {
            Some(SqlValue::Text(text)) => Value::String(text.clone()),
            Some(SqlValue::Integer(v)) => Value::Int(*v),
            _ => Value::Null,
        }
    };
    let meta = MetaData {
        version: if is_edge {
            Value::Null
        } else {
            text_column("version")
        },
        valid_from: text_column("valid_from"),
        valid_to: text_column("valid_to"),
        created_at: text_column("created_at"),
        updated_at: text_column("updated_at"),
        deleted_at: text_column("deleted_at"),
    };
    let entity = EntityData {
        id,
        kind,
        props,
        meta,
        from_id: if is_edge {
            text_column("from_id")
        } else {
            Value::Null
        },
        to_id: if is_edge {
            text_column("to_id")
        } else {
            Value::Null
        },
        is_edge,
    };
    bundle.entities.insert(alias.to_owned(), entity);
}

fn decode_props(json: &str) -> BTreeMap<String, Value> {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(serde_json::Value::Object(fields)) => fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Normalizes a dialect path column into an id array.
///
/// SQLite encodes paths as separator-joined text; Postgres returns arrays
/// (already JSON-shaped by the driver boundary).
pub(crate) fn normalize_path_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Text(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('[') {
                return super::context::sql_to_value(value, None);
            }
            Value::Array(
                text.split(PATH_SEPARATOR)
                    .map(|segment| Value::String(segment.to_owned()))
                    .collect(),
            )
        }
        SqlValue::Null => Value::Null,
        other => super::context::sql_to_value(other, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn row(columns: Vec<(&str, SqlValue)>) -> SqlRow {
        let names: Vec<String> = columns.iter().map(|(name, _)| (*name).to_owned()).collect();
        let values: Vec<SqlValue> = columns.into_iter().map(|(_, value)| value).collect();
        SqlRow::new(Arc::new(names), values)
    }

    fn minimal_ast() -> QueryAst {
        use crate::query::ast::*;
        QueryAst {
            graph_id: "g".into(),
            start: StartClause {
                alias: "p".into(),
                kinds: vec!["Person".into()],
                include_sub_classes: false,
            },
            traversals: Vec::new(),
            predicates: Vec::new(),
            projection: Vec::new(),
            temporal_mode: TemporalMode::Current,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            grouping: Grouping::default(),
            aggregate_projection: Vec::new(),
            selective_fields: None,
        }
    }

    #[test]
    fn maps_rows_in_backend_order() {
        let ast = minimal_ast();
        let rows = vec![
            row(vec![
                ("p__id", SqlValue::Text("p1".into())),
                ("p__kind", SqlValue::Text("Person".into())),
                ("p__props", SqlValue::Text(r#"{"name":"Alice"}"#.into())),
            ]),
            row(vec![
                ("p__id", SqlValue::Text("p2".into())),
                ("p__kind", SqlValue::Text("Person".into())),
                ("p__props", SqlValue::Text(r#"{"name":"Bob"}"#.into())),
            ]),
        ];
        let select: SelectFn = Arc::new(|ctx| ctx.get("p", "name"));
        let mapped = map_results(&ast, &rows, &select).expect("maps");
        assert_eq!(
            mapped,
            vec![Value::from("Alice"), Value::from("Bob")]
        );
    }

    #[test]
    fn null_id_means_absent_alias() {
        let ast = minimal_ast();
        let rows = vec![row(vec![
            ("p__id", SqlValue::Null),
            ("p__kind", SqlValue::Null),
            ("p__props", SqlValue::Null),
        ])];
        let select: SelectFn = Arc::new(|ctx| match ctx.node("p") {
            Some(node) => node.get("name"),
            None => Value::from("missing"),
        });
        let mapped = map_results(&ast, &rows, &select).expect("maps");
        assert_eq!(mapped, vec![Value::from("missing")]);
    }

    #[test]
    fn path_text_normalizes_to_id_arrays() {
        let normalized = normalize_path_value(&SqlValue::Text("p1|p2|p3".into()));
        assert_eq!(
            normalized,
            Value::Array(vec![
                Value::from("p1"),
                Value::from("p2"),
                Value::from("p3"),
            ])
        );
    }
}
