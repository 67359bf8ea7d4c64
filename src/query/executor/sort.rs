use std::cmp::Ordering;

use crate::common::types::Rid;
use crate::catalog::value::DataValue;
use crate::storage::table::Tuple;
use crate::query::expression::Expression;
use crate::query::plan::OrderDirection;
use crate::query::QueryResult;
use super::Executor;

type OrderBy = Vec<(Expression, OrderDirection)>;

fn sort_key(tuple: &Tuple, order_by: &OrderBy) -> QueryResult<Vec<DataValue>> {
    order_by.iter().map(|(expr, _)| expr.evaluate(tuple)).collect()
}

fn compare_keys(a: &[DataValue], b: &[DataValue], order_by: &OrderBy) -> Ordering {
    for (i, (_, direction)) in order_by.iter().enumerate() {
        let ord = match direction {
            OrderDirection::Ascending => a[i].compare(&b[i]),
            OrderDirection::Descending => b[i].compare(&a[i]),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Full materializing sort: drains the child, sorts by the order-by keys,
/// then streams the result.
pub struct SortExecutor {
    child: Box<Executor>,
    order_by: OrderBy,
    rows: Vec<(Vec<DataValue>, Tuple, Rid)>,
    cursor: usize,
}

impl SortExecutor {
    pub fn new(child: Box<Executor>, order_by: OrderBy) -> Self {
        Self {
            child,
            order_by,
            rows: Vec::new(),
            cursor: 0,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.rows.clear();
        self.cursor = 0;

        while let Some((tuple, rid)) = self.child.next()? {
            let key = sort_key(&tuple, &self.order_by)?;
            self.rows.push((key, tuple, rid));
        }
        let order_by = &self.order_by;
        self.rows.sort_by(|a, b| compare_keys(&a.0, &b.0, order_by));
        Ok(())
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let (_, tuple, rid) = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((tuple, rid)))
    }
}

/// Bounded top-N: keeps only the `limit` best rows while consuming the
/// child, inserting each candidate in sorted position.
pub struct TopNExecutor {
    child: Box<Executor>,
    order_by: OrderBy,
    limit: usize,
    rows: Vec<(Vec<DataValue>, Tuple, Rid)>,
    cursor: usize,
}

impl TopNExecutor {
    pub fn new(child: Box<Executor>, order_by: OrderBy, limit: usize) -> Self {
        Self {
            child,
            order_by,
            limit,
            rows: Vec::new(),
            cursor: 0,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.rows.clear();
        self.cursor = 0;
        if self.limit == 0 {
            while self.child.next()?.is_some() {}
            return Ok(());
        }

        while let Some((tuple, rid)) = self.child.next()? {
            let key = sort_key(&tuple, &self.order_by)?;
            if self.rows.len() == self.limit {
                // Reject candidates that do not beat the current worst.
                let worst = &self.rows[self.rows.len() - 1].0;
                if compare_keys(&key, worst, &self.order_by) != Ordering::Less {
                    continue;
                }
            }
            let order_by = &self.order_by;
            let at = self
                .rows
                .partition_point(|entry| compare_keys(&entry.0, &key, order_by) != Ordering::Greater);
            self.rows.insert(at, (key, tuple, rid));
            self.rows.truncate(self.limit);
        }
        Ok(())
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let (_, tuple, rid) = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((tuple, rid)))
    }
}
