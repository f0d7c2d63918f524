//! Query model: AST, fluent builder, predicate DSL, cursors, validation.

pub mod accessor;
pub mod ast;
pub mod builder;
pub mod cursor;
pub mod validate;

pub use accessor::{exists, not, not_exists, FieldAccessor, FieldSource, Predicate, SimilarOptions};
pub use builder::{
    agg, AggregateOutput, EdgeExpand, FromOptions, QueryBuilder, Recursion, ToOptions,
    TraverseOptions,
};
pub use cursor::{CursorData, CursorDirection, CURSOR_VERSION};
