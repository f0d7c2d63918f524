//! Execution pipeline: run compiled SQL, map rows, paginate, stream.

pub mod aggregate;
pub mod context;
pub mod executable;
pub mod mapping;
pub mod paginate;
pub mod prepared;
pub mod selective;
pub mod stream;
pub mod union;

pub use aggregate::ExecutableAggregateQuery;
pub use context::{MetaRef, SelectContext, SelectFn, SelectableRef};
pub use executable::{ExecutableQuery, QueryExplain};
pub use paginate::{Page, PageArgs, DEFAULT_PAGE_SIZE};
pub use prepared::PreparedQuery;
pub use stream::{QueryStream, DEFAULT_BATCH_SIZE};
pub use union::UnionableQuery;
