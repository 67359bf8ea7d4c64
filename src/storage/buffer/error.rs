use thiserror::Error;
use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Page {0} not resident")]
    PageNotResident(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Page {0} is pinned")]
    PagePinned(PageId),

    #[error("No free or evictable frame available")]
    NoFreeFrames,

    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),
}
