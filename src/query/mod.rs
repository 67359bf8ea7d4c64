pub mod expression;
pub mod plan;
pub mod optimizer;
pub mod executor;

use thiserror::Error;

use crate::storage::buffer::BufferPoolError;
use crate::storage::table::TableHeapError;
use crate::index::btree::BTreeError;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown catalog object: {0}")]
    NotFound(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Heap error: {0}")]
    HeapError(#[from] TableHeapError),

    #[error("Index error: {0}")]
    IndexError(#[from] BTreeError),

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),
}

pub type QueryResult<T> = Result<T, QueryError>;

pub use expression::{ComparisonOp, Expression, LogicOp};
pub use plan::{AggregateExpr, AggregateFunction, OrderDirection, PlanNode};
pub use optimizer::optimize_nlj_as_hash_join;
pub use executor::{create_executor, Executor, ExecutorContext};
