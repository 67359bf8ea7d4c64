use std::sync::Arc;

use crate::common::types::{Rid, TableOid};
use crate::catalog::value::DataValue;
use crate::storage::table::{TableHeap, TableIterator, Tuple};
use crate::index::btree::TreeIterator;
use crate::query::expression::Expression;
use crate::query::{QueryError, QueryResult};
use super::ExecutorContext;

/// Full scan over a table heap, skipping tombstones and rows the optional
/// predicate rejects.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    predicate: Option<Expression>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table_oid: TableOid, predicate: Option<Expression>) -> Self {
        Self {
            ctx,
            table_oid,
            predicate,
            iter: None,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        let table = self
            .ctx
            .catalog
            .get_table(self.table_oid)
            .ok_or_else(|| QueryError::NotFound(format!("table oid {}", self.table_oid)))?;
        self.iter = Some(table.heap.iter());
        Ok(())
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let iter = match self.iter.as_mut() {
            Some(iter) => iter,
            None => return Ok(None),
        };
        loop {
            let (rid, meta, tuple) = match iter.next()? {
                Some(entry) => entry,
                None => return Ok(None),
            };
            if meta.is_deleted {
                continue;
            }
            if let Some(predicate) = &self.predicate {
                if !predicate.matches(&tuple)? {
                    continue;
                }
            }
            return Ok(Some((tuple, rid)));
        }
    }
}

/// Key-ordered scan driven by a B+tree index; fetches each hit from the
/// heap and skips tombstones.
pub struct IndexScanExecutor {
    ctx: Arc<ExecutorContext>,
    index_oid: u32,
    cursor: Option<(TreeIterator<i64, Rid>, Arc<TableHeap>)>,
}

impl IndexScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, index_oid: u32) -> Self {
        Self {
            ctx,
            index_oid,
            cursor: None,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        let index = self
            .ctx
            .catalog
            .get_index(self.index_oid)
            .ok_or_else(|| QueryError::NotFound(format!("index oid {}", self.index_oid)))?;
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&index.table_name)
            .ok_or_else(|| QueryError::NotFound(index.table_name.clone()))?;
        self.cursor = Some((index.index.begin()?, table.heap.clone()));
        Ok(())
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let (iter, heap) = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => return Ok(None),
        };
        while let Some((_key, rid)) = iter.current()? {
            iter.advance()?;
            let (meta, tuple) = heap.get_tuple(rid)?;
            if meta.is_deleted {
                continue;
            }
            return Ok(Some((tuple, rid)));
        }
        Ok(None)
    }
}

/// Emits a fixed list of literal rows; the leaf under Insert
pub struct ValuesExecutor {
    rows: Vec<Vec<DataValue>>,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(rows: Vec<Vec<DataValue>>) -> Self {
        Self { rows, cursor: 0 }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((Tuple::new(row), Rid::invalid())))
    }
}
