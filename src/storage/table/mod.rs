pub mod heap;
pub mod page;
pub mod tuple;

pub use heap::{TableHeap, TableHeapError, TableIterator};
pub use tuple::{Tuple, TupleMeta};
