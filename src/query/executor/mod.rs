pub mod scan;
pub mod modify;
pub mod join;
pub mod agg;
pub mod sort;


use std::sync::Arc;

use crate::common::types::Rid;
use crate::catalog::Catalog;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::Tuple;
use super::plan::PlanNode;
use super::QueryResult;

pub use scan::{IndexScanExecutor, SeqScanExecutor, ValuesExecutor};
pub use modify::{DeleteExecutor, InsertExecutor, UpdateExecutor};
pub use join::{HashJoinExecutor, NestedLoopJoinExecutor};
pub use agg::AggregationExecutor;
pub use sort::{SortExecutor, TopNExecutor};

/// Everything an executor needs from the engine. Injected rather than
/// global so tests can assemble throwaway engines.
pub struct ExecutorContext {
    pub catalog: Arc<Catalog>,
    pub buffer_pool: Arc<BufferPoolManager>,
}

/// The operator capability set: `init` then repeated `next`, rows pulled
/// upward as `(tuple, rid)`. One variant per concrete executor; children
/// are owned by move inside each.
pub enum Executor {
    SeqScan(SeqScanExecutor),
    IndexScan(IndexScanExecutor),
    Values(ValuesExecutor),
    Insert(InsertExecutor),
    Update(UpdateExecutor),
    Delete(DeleteExecutor),
    NestedLoopJoin(NestedLoopJoinExecutor),
    HashJoin(HashJoinExecutor),
    Aggregation(AggregationExecutor),
    Sort(SortExecutor),
    TopN(TopNExecutor),
}

impl Executor {
    /// Prepare (or reset) the operator. Safe to call again to rewind.
    pub fn init(&mut self) -> QueryResult<()> {
        match self {
            Executor::SeqScan(e) => e.init(),
            Executor::IndexScan(e) => e.init(),
            Executor::Values(e) => e.init(),
            Executor::Insert(e) => e.init(),
            Executor::Update(e) => e.init(),
            Executor::Delete(e) => e.init(),
            Executor::NestedLoopJoin(e) => e.init(),
            Executor::HashJoin(e) => e.init(),
            Executor::Aggregation(e) => e.init(),
            Executor::Sort(e) => e.init(),
            Executor::TopN(e) => e.init(),
        }
    }

    /// Pull the next output row
    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        match self {
            Executor::SeqScan(e) => e.next(),
            Executor::IndexScan(e) => e.next(),
            Executor::Values(e) => e.next(),
            Executor::Insert(e) => e.next(),
            Executor::Update(e) => e.next(),
            Executor::Delete(e) => e.next(),
            Executor::NestedLoopJoin(e) => e.next(),
            Executor::HashJoin(e) => e.next(),
            Executor::Aggregation(e) => e.next(),
            Executor::Sort(e) => e.next(),
            Executor::TopN(e) => e.next(),
        }
    }
}

/// Build the executor tree for a plan
pub fn create_executor(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> QueryResult<Executor> {
    Ok(match plan {
        PlanNode::SeqScan { table_oid, predicate } => Executor::SeqScan(SeqScanExecutor::new(
            ctx.clone(),
            *table_oid,
            predicate.clone(),
        )),
        PlanNode::IndexScan { index_oid } => {
            Executor::IndexScan(IndexScanExecutor::new(ctx.clone(), *index_oid))
        }
        PlanNode::Values { rows } => Executor::Values(ValuesExecutor::new(rows.clone())),
        PlanNode::Insert { table_oid, child } => Executor::Insert(InsertExecutor::new(
            ctx.clone(),
            *table_oid,
            Box::new(create_executor(ctx, child)?),
        )),
        PlanNode::Update { table_oid, assignments, child } => Executor::Update(UpdateExecutor::new(
            ctx.clone(),
            *table_oid,
            assignments.clone(),
            Box::new(create_executor(ctx, child)?),
        )),
        PlanNode::Delete { table_oid, child } => Executor::Delete(DeleteExecutor::new(
            ctx.clone(),
            *table_oid,
            Box::new(create_executor(ctx, child)?),
        )),
        PlanNode::NestedLoopJoin { left, right, predicate } => {
            Executor::NestedLoopJoin(NestedLoopJoinExecutor::new(
                Box::new(create_executor(ctx, left)?),
                Box::new(create_executor(ctx, right)?),
                predicate.clone(),
            ))
        }
        PlanNode::HashJoin { left, right, left_keys, right_keys } => {
            Executor::HashJoin(HashJoinExecutor::new(
                Box::new(create_executor(ctx, left)?),
                Box::new(create_executor(ctx, right)?),
                left_keys.clone(),
                right_keys.clone(),
            ))
        }
        PlanNode::Aggregation { child, group_by, aggregates } => {
            Executor::Aggregation(AggregationExecutor::new(
                Box::new(create_executor(ctx, child)?),
                group_by.clone(),
                aggregates.clone(),
            ))
        }
        PlanNode::Sort { child, order_by } => Executor::Sort(SortExecutor::new(
            Box::new(create_executor(ctx, child)?),
            order_by.clone(),
        )),
        PlanNode::TopN { child, order_by, limit } => Executor::TopN(TopNExecutor::new(
            Box::new(create_executor(ctx, child)?),
            order_by.clone(),
            *limit,
        )),
    })
}
