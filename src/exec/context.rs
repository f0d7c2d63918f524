//! Select-callback contexts.
//!
//! One callback type serves three execution modes: the real row context
//! (full-blob mapping), the tracking context used to instrument which fields
//! the callback reads, and the plan-checked selective context. Callbacks
//! observe the same surface in every mode.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::query::ast::{QueryAst, TargetType};
use crate::schema::{Introspector, ValueType};
use crate::sql::SqlValue;
use crate::value::Value;

/// Select callback: maps one row context to an output value.
pub type SelectFn = Arc<dyn Fn(&SelectContext<'_>) -> Value + Send + Sync>;

/// Meta keys exposed for node aliases.
pub const NODE_META_FIELDS: &[&str] = &[
    "version",
    "valid_from",
    "valid_to",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Meta keys exposed for edge aliases (no version column).
pub const EDGE_META_FIELDS: &[&str] = &[
    "valid_from",
    "valid_to",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Alias metadata shared by the mapping and tracking machinery.
#[derive(Clone, Debug)]
pub(crate) struct AliasPlanInfo {
    pub alias: String,
    pub target_type: TargetType,
    pub kinds: Vec<String>,
    pub optional: bool,
}

pub(crate) fn alias_plan_infos(ast: &QueryAst) -> Vec<AliasPlanInfo> {
    let mut infos = vec![AliasPlanInfo {
        alias: ast.start.alias.clone(),
        target_type: TargetType::Node,
        kinds: ast.start.kinds.clone(),
        optional: false,
    }];
    for traversal in &ast.traversals {
        let mut edge_kinds = traversal.edge_kinds.clone();
        edge_kinds.extend(traversal.inverse_edge_kinds.iter().cloned());
        infos.push(AliasPlanInfo {
            alias: traversal.edge_alias.clone(),
            target_type: TargetType::Edge,
            kinds: edge_kinds,
            optional: traversal.optional,
        });
        infos.push(AliasPlanInfo {
            alias: traversal.node_alias.clone(),
            target_type: TargetType::Node,
            kinds: traversal.node_kinds.clone(),
            optional: traversal.optional,
        });
    }
    infos
}

/// A field read recorded during a tracking pass.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum TrackedField {
    System(&'static str),
    /// A `meta` read; expands to every meta key of the alias.
    Meta,
    Prop(String),
}

/// Shared recorder the tracking context writes into.
#[derive(Debug, Default)]
pub(crate) struct FieldTracker {
    accessed: Mutex<BTreeSet<(String, TrackedField)>>,
    whole_alias: Mutex<Option<String>>,
}

impl FieldTracker {
    pub fn record(&self, alias: &str, field: TrackedField) {
        self.accessed.lock().insert((alias.to_owned(), field));
    }

    pub fn record_whole(&self, alias: &str) {
        let mut whole = self.whole_alias.lock();
        if whole.is_none() {
            *whole = Some(alias.to_owned());
        }
    }

    pub fn whole_alias(&self) -> Option<String> {
        self.whole_alias.lock().clone()
    }

    pub fn accessed(&self) -> BTreeSet<(String, TrackedField)> {
        self.accessed.lock().clone()
    }
}

/// Placeholder value families supplied during tracking passes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PlaceholderMode {
    Truthy,
    Falsy,
    /// Larger placeholders, to walk length- and range-sensitive branches.
    Max,
}

impl PlaceholderMode {
    fn value_for(self, value_type: Option<ValueType>) -> Value {
        let value_type = value_type.unwrap_or(ValueType::String);
        match (self, value_type) {
            (_, ValueType::Array) | (_, ValueType::Embedding) => Value::Array(Vec::new()),
            (_, ValueType::Object) => Value::Object(BTreeMap::new()),
            (PlaceholderMode::Truthy, ValueType::Number) => Value::Int(1),
            (PlaceholderMode::Falsy, ValueType::Number) => Value::Int(0),
            (PlaceholderMode::Max, ValueType::Number) => Value::Int(1_000_000),
            (PlaceholderMode::Truthy, ValueType::Boolean) => Value::Bool(true),
            (PlaceholderMode::Falsy, ValueType::Boolean) => Value::Bool(false),
            (PlaceholderMode::Max, ValueType::Boolean) => Value::Bool(true),
            (PlaceholderMode::Truthy, ValueType::Date) => {
                Value::date("2000-01-01T00:00:00Z").unwrap_or(Value::Null)
            }
            (PlaceholderMode::Falsy, ValueType::Date) => {
                Value::date("1970-01-01T00:00:00Z").unwrap_or(Value::Null)
            }
            (PlaceholderMode::Max, ValueType::Date) => {
                Value::date("9999-12-31T00:00:00Z").unwrap_or(Value::Null)
            }
            (PlaceholderMode::Truthy, _) => Value::String("x".to_owned()),
            (PlaceholderMode::Falsy, _) => Value::String(String::new()),
            (PlaceholderMode::Max, _) => Value::String("x".repeat(64)),
        }
    }
}

/// Tracking-pass state shared across one callback invocation.
pub(crate) struct TrackingSession {
    pub tracker: Arc<FieldTracker>,
    pub mode: PlaceholderMode,
    /// When set, optional aliases read as absent.
    pub absent_optionals: bool,
    pub aliases: Vec<AliasPlanInfo>,
    pub introspector: Arc<Introspector>,
}

impl TrackingSession {
    fn alias_info(&self, alias: &str) -> Option<&AliasPlanInfo> {
        self.aliases.iter().find(|info| info.alias == alias)
    }

    fn prop_placeholder(&self, info: &AliasPlanInfo, field: &str) -> Value {
        let type_info = match info.target_type {
            TargetType::Node => self
                .introspector
                .shared_field_type_info(&info.kinds, field),
            TargetType::Edge => self
                .introspector
                .shared_edge_field_type_info(&info.kinds, field),
        };
        self.mode.value_for(type_info.map(|i| i.value_type))
    }
}

/// Mapped metadata columns of one entity.
#[derive(Clone, Debug, Default)]
pub(crate) struct MetaData {
    pub version: Value,
    pub valid_from: Value,
    pub valid_to: Value,
    pub created_at: Value,
    pub updated_at: Value,
    pub deleted_at: Value,
}

impl MetaData {
    pub fn get(&self, field: &str) -> Value {
        match field {
            "version" => self.version.clone(),
            "valid_from" => self.valid_from.clone(),
            "valid_to" => self.valid_to.clone(),
            "created_at" => self.created_at.clone(),
            "updated_at" => self.updated_at.clone(),
            "deleted_at" => self.deleted_at.clone(),
            _ => Value::Null,
        }
    }

    pub fn to_value(&self, is_edge: bool) -> Value {
        let fields = if is_edge {
            EDGE_META_FIELDS
        } else {
            NODE_META_FIELDS
        };
        Value::Object(
            fields
                .iter()
                .map(|field| ((*field).to_owned(), self.get(field)))
                .collect(),
        )
    }
}

/// One fully materialized entity from the full-blob path.
#[derive(Clone, Debug)]
pub(crate) struct EntityData {
    pub id: String,
    pub kind: String,
    pub props: BTreeMap<String, Value>,
    pub meta: MetaData,
    pub from_id: Value,
    pub to_id: Value,
    pub is_edge: bool,
}

impl EntityData {
    pub fn to_value(&self) -> Value {
        let mut fields: BTreeMap<String, Value> = self.props.clone();
        fields.insert("id".to_owned(), Value::String(self.id.clone()));
        fields.insert("kind".to_owned(), Value::String(self.kind.clone()));
        if self.is_edge {
            fields.insert("from_id".to_owned(), self.from_id.clone());
            fields.insert("to_id".to_owned(), self.to_id.clone());
        }
        fields.insert("meta".to_owned(), self.meta.to_value(self.is_edge));
        Value::Object(fields)
    }
}

/// One mapped row on the full-blob path: entities by alias plus extra
/// result columns (recursive depth/path).
#[derive(Clone, Debug, Default)]
pub(crate) struct RowBundle {
    pub entities: FxHashMap<String, EntityData>,
    pub extra: BTreeMap<String, Value>,
}

/// Per-alias selective plan: the fields the compiled row materializes.
#[derive(Clone, Debug, Default)]
pub(crate) struct SelectivePlan {
    /// field name (`id`, `meta.version`, or a prop name) -> (column, type).
    pub fields: BTreeMap<String, (String, Option<ValueType>)>,
}

/// Row state for the plan-checked selective context.
pub(crate) struct SelectiveSession<'a> {
    pub plans: &'a FxHashMap<String, SelectivePlan>,
    pub aliases: &'a [AliasPlanInfo],
    pub row: &'a crate::backend::SqlRow,
    /// First out-of-plan read, reported as the fallback signal.
    pub missing: Mutex<Option<(String, String)>>,
}

impl SelectiveSession<'_> {
    fn record_missing(&self, alias: &str, field: &str) {
        let mut missing = self.missing.lock();
        if missing.is_none() {
            *missing = Some((alias.to_owned(), field.to_owned()));
        }
    }

    fn read_field(&self, alias: &str, field: &str) -> Value {
        let Some(plan) = self.plans.get(alias) else {
            self.record_missing(alias, field);
            return Value::Null;
        };
        let Some((column, value_type)) = plan.fields.get(field) else {
            self.record_missing(alias, field);
            return Value::Null;
        };
        match self.row.get(column) {
            Some(value) => sql_to_value(value, *value_type),
            None => {
                self.record_missing(alias, field);
                Value::Null
            }
        }
    }

    fn alias_absent(&self, alias: &str) -> bool {
        let optional = self
            .aliases
            .iter()
            .find(|info| info.alias == alias)
            .map(|info| info.optional)
            .unwrap_or(false);
        if !optional {
            return false;
        }
        let Some(plan) = self.plans.get(alias) else {
            return false;
        };
        let Some((column, _)) = plan.fields.get("id") else {
            return false;
        };
        matches!(self.row.get(column), Some(SqlValue::Null) | None)
    }
}

pub(crate) enum ContextInner<'a> {
    Real(&'a RowBundle),
    Tracking(&'a TrackingSession),
    Selective(&'a SelectiveSession<'a>),
}

/// The value handed to select callbacks.
pub struct SelectContext<'a> {
    pub(crate) inner: ContextInner<'a>,
}

impl<'a> SelectContext<'a> {
    pub(crate) fn real(bundle: &'a RowBundle) -> Self {
        Self {
            inner: ContextInner::Real(bundle),
        }
    }

    pub(crate) fn tracking(session: &'a TrackingSession) -> Self {
        Self {
            inner: ContextInner::Tracking(session),
        }
    }

    pub(crate) fn selective(session: &'a SelectiveSession<'a>) -> Self {
        Self {
            inner: ContextInner::Selective(session),
        }
    }

    /// The node bound to `alias`; absent for unmatched optional traversals.
    pub fn node(&self, alias: &str) -> Option<SelectableRef<'_>> {
        self.entity(alias, false)
    }

    /// The edge bound to `alias`; absent for unmatched optional traversals.
    pub fn edge(&self, alias: &str) -> Option<SelectableRef<'_>> {
        self.entity(alias, true)
    }

    fn entity(&self, alias: &str, expect_edge: bool) -> Option<SelectableRef<'_>> {
        match &self.inner {
            ContextInner::Real(bundle) => {
                let entity = bundle.entities.get(alias)?;
                if entity.is_edge != expect_edge {
                    return None;
                }
                Some(SelectableRef {
                    inner: RefInner::Real(entity),
                })
            }
            ContextInner::Tracking(session) => {
                let session = *session;
                let info = session.alias_info(alias)?;
                let is_edge = info.target_type == TargetType::Edge;
                if is_edge != expect_edge {
                    return None;
                }
                if session.absent_optionals && info.optional {
                    return None;
                }
                Some(SelectableRef {
                    inner: RefInner::Tracking {
                        session,
                        alias: alias.to_owned(),
                    },
                })
            }
            ContextInner::Selective(session) => {
                let session = *session;
                let info = session.aliases.iter().find(|info| info.alias == alias)?;
                let is_edge = info.target_type == TargetType::Edge;
                if is_edge != expect_edge {
                    return None;
                }
                if session.alias_absent(alias) {
                    return None;
                }
                Some(SelectableRef {
                    inner: RefInner::Selective {
                        session,
                        alias: alias.to_owned(),
                    },
                })
            }
        }
    }

    /// Convenience: read one field of an alias, null when absent.
    pub fn get(&self, alias: &str, field: &str) -> Value {
        self.node(alias)
            .or_else(|| self.edge(alias))
            .map(|entity| entity.get(field))
            .unwrap_or(Value::Null)
    }

    /// Reads an extra result column (recursive depth/path aliases).
    pub fn column(&self, name: &str) -> Value {
        match &self.inner {
            ContextInner::Real(bundle) => bundle.extra.get(name).cloned().unwrap_or(Value::Null),
            ContextInner::Tracking(session) => session.mode.value_for(Some(ValueType::Number)),
            ContextInner::Selective(session) => session
                .row
                .get(name)
                .map(|value| sql_to_value(value, None))
                .unwrap_or(Value::Null),
        }
    }
}

enum RefInner<'a> {
    Real(&'a EntityData),
    Tracking {
        session: &'a TrackingSession,
        alias: String,
    },
    Selective {
        session: &'a SelectiveSession<'a>,
        alias: String,
    },
}

/// Handle to one alias's entity within a row.
pub struct SelectableRef<'a> {
    inner: RefInner<'a>,
}

impl SelectableRef<'_> {
    /// Reads a schema property.
    pub fn get(&self, field: &str) -> Value {
        match &self.inner {
            RefInner::Real(entity) => entity.props.get(field).cloned().unwrap_or(Value::Null),
            RefInner::Tracking { session, alias } => {
                session
                    .tracker
                    .record(alias, TrackedField::Prop(field.to_owned()));
                match session.alias_info(alias) {
                    Some(info) => session.prop_placeholder(info, field),
                    None => Value::Null,
                }
            }
            RefInner::Selective { session, alias } => session.read_field(alias, field),
        }
    }

    pub fn id(&self) -> Value {
        self.system("id")
    }

    pub fn kind(&self) -> Value {
        self.system("kind")
    }

    pub fn from_id(&self) -> Value {
        self.system("from_id")
    }

    pub fn to_id(&self) -> Value {
        self.system("to_id")
    }

    fn system(&self, field: &'static str) -> Value {
        match &self.inner {
            RefInner::Real(entity) => match field {
                "id" => Value::String(entity.id.clone()),
                "kind" => Value::String(entity.kind.clone()),
                "from_id" => entity.from_id.clone(),
                "to_id" => entity.to_id.clone(),
                _ => Value::Null,
            },
            RefInner::Tracking { session, alias } => {
                session.tracker.record(alias, TrackedField::System(field));
                session.mode.value_for(Some(ValueType::String))
            }
            RefInner::Selective { session, alias } => session.read_field(alias, field),
        }
    }

    /// Access to the entity's system metadata.
    pub fn meta(&self) -> MetaRef<'_> {
        if let RefInner::Tracking { session, alias } = &self.inner {
            session.tracker.record(alias, TrackedField::Meta);
        }
        MetaRef { parent: self }
    }

    /// Materializes the whole entity as one value.
    ///
    /// On the selective path this is the whole-alias detection point: the
    /// plan cannot satisfy it, so the executor falls back to full blobs.
    pub fn value(&self) -> Value {
        match &self.inner {
            RefInner::Real(entity) => entity.to_value(),
            RefInner::Tracking { session, alias } => {
                session.tracker.record_whole(alias);
                Value::Object(BTreeMap::new())
            }
            RefInner::Selective { session, alias } => {
                session.record_missing(alias, "whole node/edge selection");
                Value::Null
            }
        }
    }

    fn meta_field(&self, field: &'static str) -> Value {
        match &self.inner {
            RefInner::Real(entity) => entity.meta.get(field),
            RefInner::Tracking { session, alias } => {
                session.tracker.record(alias, TrackedField::Meta);
                if field == "version" {
                    session.mode.value_for(Some(ValueType::Number))
                } else {
                    session.mode.value_for(Some(ValueType::String))
                }
            }
            RefInner::Selective { session, alias } => {
                session.read_field(alias, &format!("meta.{field}"))
            }
        }
    }
}

/// Metadata sub-accessor of one entity.
pub struct MetaRef<'a> {
    parent: &'a SelectableRef<'a>,
}

impl MetaRef<'_> {
    pub fn version(&self) -> Value {
        self.parent.meta_field("version")
    }

    pub fn valid_from(&self) -> Value {
        self.parent.meta_field("valid_from")
    }

    pub fn valid_to(&self) -> Value {
        self.parent.meta_field("valid_to")
    }

    pub fn created_at(&self) -> Value {
        self.parent.meta_field("created_at")
    }

    pub fn updated_at(&self) -> Value {
        self.parent.meta_field("updated_at")
    }

    pub fn deleted_at(&self) -> Value {
        self.parent.meta_field("deleted_at")
    }
}

/// Converts a backend value into a result value, decoding JSON text for
/// compound types.
pub(crate) fn sql_to_value(value: &SqlValue, value_type: Option<ValueType>) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => match value_type {
            Some(ValueType::Boolean) => Value::Bool(*v != 0),
            _ => Value::Int(*v),
        },
        SqlValue::Real(v) => Value::Float(*v),
        SqlValue::Text(text) => match value_type {
            Some(ValueType::Array) | Some(ValueType::Object) | Some(ValueType::Embedding) => {
                serde_json::from_str::<serde_json::Value>(text)
                    .map(|json| Value::from_json(&json))
                    .unwrap_or_else(|_| Value::String(text.clone()))
            }
            Some(ValueType::Unknown) | None => {
                let trimmed = text.trim_start();
                if trimmed.starts_with('[') || trimmed.starts_with('{') {
                    serde_json::from_str::<serde_json::Value>(text)
                        .map(|json| Value::from_json(&json))
                        .unwrap_or_else(|_| Value::String(text.clone()))
                } else {
                    Value::String(text.clone())
                }
            }
            _ => Value::String(text.clone()),
        },
        SqlValue::Blob(_) => Value::Null,
    }
}
