use std::sync::Arc;

use crate::common::types::{Rid, TableOid};
use crate::catalog::{IndexInfo, TableInfo};
use crate::catalog::value::DataValue;
use crate::storage::table::{Tuple, TupleMeta};
use crate::query::expression::Expression;
use crate::query::{QueryError, QueryResult};
use super::{Executor, ExecutorContext};

fn resolve_table(
    ctx: &ExecutorContext,
    table_oid: TableOid,
) -> QueryResult<(Arc<TableInfo>, Vec<Arc<IndexInfo>>)> {
    let table = ctx
        .catalog
        .get_table(table_oid)
        .ok_or_else(|| QueryError::NotFound(format!("table oid {table_oid}")))?;
    let indexes = ctx.catalog.get_table_indexes(&table.name);
    Ok((table, indexes))
}

fn single_count_row(count: i64) -> (Tuple, Rid) {
    (Tuple::new(vec![DataValue::Integer(count)]), Rid::invalid())
}

/// Pulls rows from its child, appends them to the table heap and maintains
/// every index; emits one row holding the insert count.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    child: Box<Executor>,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table_oid: TableOid, child: Box<Executor>) -> Self {
        Self {
            ctx,
            table_oid,
            child,
            done: false,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.done = false;
        self.child.init()
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let (table, indexes) = resolve_table(&self.ctx, self.table_oid)?;

        let mut count = 0i64;
        while let Some((tuple, _)) = self.child.next()? {
            let rid = table.heap.insert_tuple(TupleMeta::live(), &tuple)?;
            for index in &indexes {
                if let Some(key) = index.key_of(&tuple.values) {
                    index.index.insert(key, rid)?;
                }
            }
            count += 1;
        }
        self.done = true;
        Ok(Some(single_count_row(count)))
    }
}

/// Tombstones every row its child produces and scrubs index entries;
/// emits one row holding the delete count.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    child: Box<Executor>,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table_oid: TableOid, child: Box<Executor>) -> Self {
        Self {
            ctx,
            table_oid,
            child,
            done: false,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.done = false;
        self.child.init()
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let (table, indexes) = resolve_table(&self.ctx, self.table_oid)?;

        let mut count = 0i64;
        while let Some((tuple, rid)) = self.child.next()? {
            table.heap.update_tuple_meta(rid, TupleMeta::deleted())?;
            for index in &indexes {
                if let Some(key) = index.key_of(&tuple.values) {
                    index.index.remove(&key)?;
                }
            }
            count += 1;
        }
        self.done = true;
        Ok(Some(single_count_row(count)))
    }
}

/// Delete-and-reinsert update: the old version is tombstoned, the new
/// version appended, indexes repointed; emits one row with the count.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    assignments: Vec<(usize, Expression)>,
    child: Box<Executor>,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        assignments: Vec<(usize, Expression)>,
        child: Box<Executor>,
    ) -> Self {
        Self {
            ctx,
            table_oid,
            assignments,
            child,
            done: false,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.done = false;
        self.child.init()
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let (table, indexes) = resolve_table(&self.ctx, self.table_oid)?;

        let mut count = 0i64;
        while let Some((old_tuple, old_rid)) = self.child.next()? {
            let mut values = old_tuple.values.clone();
            for (column, expr) in &self.assignments {
                if *column >= values.len() {
                    return Err(QueryError::InvalidExpression(format!(
                        "assignment to column {column} out of range"
                    )));
                }
                values[*column] = expr.evaluate(&old_tuple)?;
            }
            let new_tuple = Tuple::new(values);

            table.heap.update_tuple_meta(old_rid, TupleMeta::deleted())?;
            let new_rid = table.heap.insert_tuple(TupleMeta::live(), &new_tuple)?;
            for index in &indexes {
                if let Some(key) = index.key_of(&old_tuple.values) {
                    index.index.remove(&key)?;
                }
                if let Some(key) = index.key_of(&new_tuple.values) {
                    index.index.insert(key, new_rid)?;
                }
            }
            count += 1;
        }
        self.done = true;
        Ok(Some(single_count_row(count)))
    }
}
