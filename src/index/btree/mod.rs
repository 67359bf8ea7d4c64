pub mod error;
pub mod node;
pub mod serialization;
pub mod tree;

pub use error::BTreeError;
pub use node::BTreeNode;
pub use tree::{BPlusTree, TreeIterator};
