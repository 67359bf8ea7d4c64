use std::collections::{HashMap, VecDeque};

use crate::common::types::Rid;
use crate::catalog::value::DataValue;
use crate::storage::table::Tuple;
use crate::query::expression::Expression;
use crate::query::QueryResult;
use super::Executor;

/// Inner nested-loop join: the right child is re-initialized for every
/// outer row, so it must be rewindable (every executor here is).
pub struct NestedLoopJoinExecutor {
    left: Box<Executor>,
    right: Box<Executor>,
    predicate: Expression,
    outer: Option<Tuple>,
}

impl NestedLoopJoinExecutor {
    pub fn new(left: Box<Executor>, right: Box<Executor>, predicate: Expression) -> Self {
        Self {
            left,
            right,
            predicate,
            outer: None,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.outer = None;
        self.left.init()?;
        self.right.init()
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            if self.outer.is_none() {
                match self.left.next()? {
                    Some((tuple, _)) => {
                        self.outer = Some(tuple);
                        self.right.init()?;
                    }
                    None => return Ok(None),
                }
            }

            let inner = self.right.next()?;
            match (&self.outer, inner) {
                (Some(outer), Some((inner, _))) => {
                    if self.predicate.matches_join(outer, &inner)? {
                        return Ok(Some((outer.join(&inner), Rid::invalid())));
                    }
                }
                _ => {
                    // Inner side exhausted: move to the next outer row.
                    self.outer = None;
                }
            }
        }
    }
}

/// Inner hash join: builds a table on the left child's keys, probes with
/// the right child's rows. Key expressions are evaluated against their own
/// side only (tuple index 0).
pub struct HashJoinExecutor {
    left: Box<Executor>,
    right: Box<Executor>,
    left_keys: Vec<Expression>,
    right_keys: Vec<Expression>,
    table: HashMap<Vec<DataValue>, Vec<Tuple>>,
    pending: VecDeque<Tuple>,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<Executor>,
        right: Box<Executor>,
        left_keys: Vec<Expression>,
        right_keys: Vec<Expression>,
    ) -> Self {
        Self {
            left,
            right,
            left_keys,
            right_keys,
            table: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    fn key_of(tuple: &Tuple, exprs: &[Expression]) -> QueryResult<Option<Vec<DataValue>>> {
        let mut key = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let value = expr.evaluate(tuple)?;
            if value.is_null() {
                // NULL keys join with nothing.
                return Ok(None);
            }
            key.push(value);
        }
        Ok(Some(key))
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.table.clear();
        self.pending.clear();

        self.left.init()?;
        while let Some((tuple, _)) = self.left.next()? {
            if let Some(key) = Self::key_of(&tuple, &self.left_keys)? {
                self.table.entry(key).or_default().push(tuple);
            }
        }
        self.right.init()
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            if let Some(joined) = self.pending.pop_front() {
                return Ok(Some((joined, Rid::invalid())));
            }
            let (probe, _) = match self.right.next()? {
                Some(row) => row,
                None => return Ok(None),
            };
            let key = match Self::key_of(&probe, &self.right_keys)? {
                Some(key) => key,
                None => continue,
            };
            if let Some(matches) = self.table.get(&key) {
                for build in matches {
                    self.pending.push_back(build.join(&probe));
                }
            }
        }
    }
}
