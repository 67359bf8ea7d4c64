use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel for "no page"
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Buffer pool frame ID type
pub type FrameId = u32;

/// Transaction ID type
pub type TxnId = u32;

/// Sentinel for "no transaction"
pub const INVALID_TXN_ID: TxnId = TxnId::MAX;

/// Table OID type
pub type TableOid = u32;

/// Monotonic timestamp used by the LRU-K replacer
pub type Timestamp = u64;

/// Record ID: a tuple's physical address (page, slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Placeholder for rows that have no physical address
    pub fn invalid() -> Self {
        Self { page_id: INVALID_PAGE_ID, slot: 0 }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure: a fixed-size byte buffer plus its identity.
/// Pin count and dirty bit are frame-level bookkeeping and live in the
/// buffer pool manager; the surrounding `RwLock` is the page latch.
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
        self.page_id = INVALID_PAGE_ID;
    }
}

/// Smart pointer to a latched page
pub type PagePtr = Arc<RwLock<Page>>;
