//! Batched streaming over paginated queries.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::exec::executable::ExecutableQuery;
use crate::exec::paginate::PageArgs;
use crate::value::Value;

/// Default batch size for [`ExecutableQuery::stream`].
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Pull-based iterator that fetches pages of `batch_size` as it drains.
///
/// The page fetch is the only blocking call; between batches the iterator
/// holds no backend resources.
pub struct QueryStream<'a> {
    query: &'a ExecutableQuery,
    batch_size: u64,
    buffer: VecDeque<Value>,
    cursor: Option<String>,
    exhausted: bool,
    failed: bool,
}

impl<'a> QueryStream<'a> {
    pub(crate) fn new(query: &'a ExecutableQuery, batch_size: u64) -> Result<Self> {
        if query.ast().order_by.is_empty() {
            return Err(Error::validation_at(
                "stream requires a non-empty orderBy",
                "orderBy",
            )
            .with_suggestion("add order_by(alias, field, direction) before streaming"));
        }
        if batch_size == 0 {
            return Err(Error::validation("stream batch size must be at least 1"));
        }
        Ok(Self {
            query,
            batch_size,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            failed: false,
        })
    }

    fn fill(&mut self) -> Result<()> {
        let args = match self.cursor.take() {
            Some(cursor) => PageArgs::first_after(self.batch_size, cursor),
            None => PageArgs::first(self.batch_size),
        };
        let page = self.query.paginate(args)?;
        self.buffer.extend(page.items);
        self.cursor = page.next_cursor;
        self.exhausted = !page.has_next_page;
        Ok(())
    }
}

impl Iterator for QueryStream<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            if let Err(error) = self.fill() {
                self.failed = true;
                return Some(Err(error));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
