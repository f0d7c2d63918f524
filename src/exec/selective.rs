//! Smart selective projection.
//!
//! Before issuing SQL, the executor runs the select callback against
//! tracking contexts to learn which fields it actually reads, builds a
//! sorted [`SelectiveField`] plan from the recorded accesses, and compiles a
//! statement that extracts only those columns. Row mapping then runs the
//! callback against a plan-checked context; any out-of-plan read raises the
//! internal fallback signal instead of returning wrong data.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::backend::SqlRow;
use crate::error::{Error, Result};
use crate::exec::context::{
    alias_plan_infos, AliasPlanInfo, FieldTracker, PlaceholderMode, SelectContext, SelectFn,
    SelectivePlan, SelectiveSession, TrackedField, TrackingSession, EDGE_META_FIELDS,
    NODE_META_FIELDS,
};
use crate::query::ast::{QueryAst, SelectiveField, TargetType, ValueTypeTag};
use crate::schema::Introspector;
use crate::value::Value;

/// What the instrumentation passes learned about the callback.
pub(crate) struct TrackingOutcome {
    pub fields: std::collections::BTreeSet<(String, TrackedField)>,
    pub whole_alias: Option<String>,
}

/// Runs the truthy/falsy/max passes, plus an absent-optional pass when the
/// query has optional traversals.
pub(crate) fn run_tracking_passes(
    ast: &QueryAst,
    select_fn: &SelectFn,
    introspector: &Arc<Introspector>,
) -> TrackingOutcome {
    let aliases = alias_plan_infos(ast);
    let has_optional = aliases.iter().any(|info| info.optional);
    let tracker = Arc::new(FieldTracker::default());

    let modes = [
        PlaceholderMode::Truthy,
        PlaceholderMode::Falsy,
        PlaceholderMode::Max,
    ];
    for mode in modes {
        run_pass(select_fn, &tracker, mode, false, &aliases, introspector);
        if tracker.whole_alias().is_some() {
            break;
        }
    }
    if has_optional && tracker.whole_alias().is_none() {
        run_pass(
            select_fn,
            &tracker,
            PlaceholderMode::Truthy,
            true,
            &aliases,
            introspector,
        );
    }
    TrackingOutcome {
        fields: tracker.accessed(),
        whole_alias: tracker.whole_alias(),
    }
}

fn run_pass(
    select_fn: &SelectFn,
    tracker: &Arc<FieldTracker>,
    mode: PlaceholderMode,
    absent_optionals: bool,
    aliases: &[AliasPlanInfo],
    introspector: &Arc<Introspector>,
) {
    let session = TrackingSession {
        tracker: Arc::clone(tracker),
        mode,
        absent_optionals,
        aliases: aliases.to_vec(),
        introspector: Arc::clone(introspector),
    };
    let context = SelectContext::tracking(&session);
    let _ = select_fn(&context);
}

/// Builds the sorted selective plan, or nothing when optimization must stay
/// off (whole-alias return, or no recorded reads).
pub(crate) fn build_selective_fields(
    ast: &QueryAst,
    outcome: &TrackingOutcome,
    introspector: &Arc<Introspector>,
) -> Option<Vec<SelectiveField>> {
    if let Some(alias) = &outcome.whole_alias {
        trace!(target: "grafo::selective", alias, "whole-alias return disables optimization");
        return None;
    }
    if outcome.fields.is_empty() {
        trace!(target: "grafo::selective", "no recorded reads, optimization off");
        return None;
    }
    let aliases = alias_plan_infos(ast);
    let mut fields: Vec<SelectiveField> = Vec::new();
    for (alias, tracked) in &outcome.fields {
        let Some(info) = aliases.iter().find(|info| &info.alias == alias) else {
            continue;
        };
        match tracked {
            TrackedField::System(name) => {
                push_unique(&mut fields, system_field(alias, name));
            }
            TrackedField::Meta => {
                let meta_fields = match info.target_type {
                    TargetType::Node => NODE_META_FIELDS,
                    TargetType::Edge => EDGE_META_FIELDS,
                };
                for name in meta_fields {
                    push_unique(
                        &mut fields,
                        SelectiveField {
                            alias: alias.clone(),
                            field: format!("meta.{name}"),
                            output_name: format!("{alias}__meta_{name}"),
                            is_system_field: true,
                            value_type: None,
                        },
                    );
                }
            }
            TrackedField::Prop(name) => {
                let type_info = match info.target_type {
                    TargetType::Node => introspector.shared_field_type_info(&info.kinds, name),
                    TargetType::Edge => {
                        introspector.shared_edge_field_type_info(&info.kinds, name)
                    }
                };
                push_unique(
                    &mut fields,
                    SelectiveField {
                        alias: alias.clone(),
                        field: name.clone(),
                        output_name: format!("{alias}__p_{name}"),
                        is_system_field: false,
                        value_type: type_info.map(|i| ValueTypeTag(i.value_type)),
                    },
                );
            }
        }
    }

    // Every optional alias keeps its id column so absence stays detectable.
    for info in &aliases {
        if info.optional {
            push_unique(&mut fields, system_field(&info.alias, "id"));
        }
    }

    fields.sort();
    Some(fields)
}

fn system_field(alias: &str, name: &str) -> SelectiveField {
    SelectiveField {
        alias: alias.to_owned(),
        field: name.to_owned(),
        output_name: format!("{alias}__{name}"),
        is_system_field: true,
        value_type: None,
    }
}

fn push_unique(fields: &mut Vec<SelectiveField>, field: SelectiveField) {
    if !fields
        .iter()
        .any(|existing| existing.alias == field.alias && existing.field == field.field)
    {
        fields.push(field);
    }
}

/// Per-alias lookup plans for the selective row context.
pub(crate) fn plans_from_fields(
    fields: &[SelectiveField],
) -> FxHashMap<String, SelectivePlan> {
    let mut plans: FxHashMap<String, SelectivePlan> = FxHashMap::default();
    for field in fields {
        plans
            .entry(field.alias.clone())
            .or_default()
            .fields
            .insert(
                field.field.clone(),
                (field.output_name.clone(), field.value_type.map(|tag| tag.0)),
            );
    }
    plans
}

/// Maps rows through the plan-checked context.
///
/// Raises [`Error::MissingSelectiveField`] on the first out-of-plan read;
/// the executor catches it and reruns on the full-blob path.
pub(crate) fn map_selective_results(
    ast: &QueryAst,
    fields: &[SelectiveField],
    rows: &[SqlRow],
    select_fn: &SelectFn,
) -> Result<Vec<Value>> {
    let plans = plans_from_fields(fields);
    let aliases = alias_plan_infos(ast);
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let session = SelectiveSession {
            plans: &plans,
            aliases: &aliases,
            row,
            missing: Mutex::new(None),
        };
        let context = SelectContext::selective(&session);
        let value = select_fn(&context);
        if let Some((alias, field)) = session.missing.lock().take() {
            return Err(Error::MissingSelectiveField { alias, field });
        }
        out.push(value);
    }
    Ok(out)
}
