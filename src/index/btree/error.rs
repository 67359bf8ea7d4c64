use thiserror::Error;
use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Failed to serialize node: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize node: {0}")]
    DeserializationError(String),

    #[error("Node does not fit in a page")]
    NodeTooLarge,

    #[error("Page {0} holds no valid tree node")]
    InvalidPageFormat(PageId),
}
