use std::sync::Arc;
use parking_lot::{RawRwLock, RwLock};
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use log::warn;

use crate::common::types::{Page, PageId, PagePtr};
use crate::storage::buffer::BufferPoolManager;

/// Scoped ownership of one fetched (pinned) page.
///
/// Dropping the guard unpins the page with whatever dirty bit the holder
/// set. Guards are move-only; the buffer pool must outlive every guard,
/// which the embedded `Arc` enforces.
pub struct PageGuard {
    bpm: Arc<BufferPoolManager>,
    page: PagePtr,
    page_id: PageId,
    is_dirty: bool,
}

impl PageGuard {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page: PagePtr, page_id: PageId) -> Self {
        Self {
            bpm,
            page,
            page_id,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The latched page; callers latch it themselves for raw access
    pub fn page(&self) -> &PagePtr {
        &self.page
    }

    /// Mark the page dirty so the eventual unpin records the modification
    pub fn set_dirty(&mut self) {
        self.is_dirty = true;
    }

    fn rwlock(&self) -> &Arc<RwLock<Page>> {
        &self.page
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        // The unpin can only fail if bookkeeping is already corrupt;
        // a drop path must not panic over it.
        if let Err(e) = self.bpm.unpin_page(self.page_id, self.is_dirty) {
            warn!("unpin of page {} failed on guard drop: {}", self.page_id, e);
        }
    }
}

/// A pinned page held under its shared latch.
///
/// The latch guard is declared before the pin guard so drop order releases
/// the latch first, then the pin.
pub struct ReadPageGuard {
    latch: ArcRwLockReadGuard<RawRwLock, Page>,
    guard: PageGuard,
}

impl ReadPageGuard {
    pub(crate) fn new(guard: PageGuard) -> Self {
        let latch = RwLock::read_arc(guard.rwlock());
        Self { latch, guard }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.data
    }
}

/// A pinned page held under its exclusive latch. Mutable access marks the
/// page dirty.
pub struct WritePageGuard {
    latch: ArcRwLockWriteGuard<RawRwLock, Page>,
    guard: PageGuard,
}

impl WritePageGuard {
    pub(crate) fn new(guard: PageGuard) -> Self {
        let latch = RwLock::write_arc(guard.rwlock());
        Self { latch, guard }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.guard.set_dirty();
        &mut self.latch.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use tempfile::TempDir;

    fn test_pool() -> (TempDir, Arc<BufferPoolManager>) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path().join("test.db")).unwrap());
        (dir, Arc::new(BufferPoolManager::new(4, 2, disk)))
    }

    #[test]
    fn test_guard_unpins_on_drop() {
        let (_dir, bpm) = test_pool();
        let (p0, guard) = bpm.new_page_guarded().unwrap();
        assert_eq!(bpm.pin_count_of(p0), Some(1));
        drop(guard);
        assert_eq!(bpm.pin_count_of(p0), Some(0));
    }

    #[test]
    fn test_write_guard_marks_dirty_and_persists() {
        let (_dir, bpm) = test_pool();
        let (p0, mut guard) = bpm.new_page_write().unwrap();
        guard.data_mut()[10] = 0x42;
        drop(guard);

        bpm.flush_page(p0).unwrap();
        let read_guard = bpm.fetch_page_read(p0).unwrap();
        assert_eq!(read_guard.data()[10], 0x42);
    }

    #[test]
    fn test_read_guards_share_the_latch() {
        let (_dir, bpm) = test_pool();
        let (p0, guard) = bpm.new_page_write().unwrap();
        drop(guard);

        let r1 = bpm.fetch_page_read(p0).unwrap();
        let r2 = bpm.fetch_page_read(p0).unwrap();
        assert_eq!(r1.page_id(), r2.page_id());
        assert_eq!(bpm.pin_count_of(p0), Some(2));
        drop(r1);
        drop(r2);
        assert_eq!(bpm.pin_count_of(p0), Some(0));
    }

    #[test]
    fn test_write_latch_excludes_readers() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let (_dir, bpm) = test_pool();
        let (p0, guard) = bpm.new_page_write().unwrap();

        let flag = Arc::new(AtomicBool::new(false));
        let reader = {
            let bpm = bpm.clone();
            let flag = flag.clone();
            std::thread::spawn(move || {
                let _r = bpm.fetch_page_read(p0).unwrap();
                flag.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!flag.load(Ordering::SeqCst), "reader got through a held write latch");
        drop(guard);
        reader.join().unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }
}
