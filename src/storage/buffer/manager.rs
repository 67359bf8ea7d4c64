use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use log::debug;

use crate::common::types::{FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::disk::DiskManager;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruKReplacer;
use crate::storage::page::guard::{PageGuard, ReadPageGuard, WritePageGuard};

/// Frame-level bookkeeping. Page data lives in the shared frame array so
/// latches can be taken without the pool mutex.
struct FrameMeta {
    pin_count: u32,
    is_dirty: bool,
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    meta: Vec<FrameMeta>,
    replacer: LruKReplacer,
    next_page_id: PageId,
}

/// Fixed-size page cache over a disk manager.
///
/// All bookkeeping (page table, free list, pin counts, replacer) is
/// serialized by one mutex; page contents are protected per-page by the
/// latch inside each frame, which callers take through guards.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<PagePtr>,
    disk_manager: Arc<DiskManager>,
    state: Mutex<PoolState>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        let mut meta = Vec::with_capacity(pool_size);

        for i in 0..pool_size {
            frames.push(Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))));
            free_list.push_back(i as FrameId);
            meta.push(FrameMeta { pin_count: 0, is_dirty: false });
        }

        // Resume id allocation past whatever the file already holds.
        let next_page_id = disk_manager.page_capacity().unwrap_or(0);

        Self {
            pool_size,
            frames,
            disk_manager,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                meta,
                replacer: LruKReplacer::new(pool_size, replacer_k),
                next_page_id,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Obtain a frame for `page_id`: free list first, else evict a victim
    /// (flushing it when dirty). The frame comes back pinned once and
    /// registered in the page table. Called with the state mutex held.
    fn allocate_frame(&self, state: &mut PoolState, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        let frame_id = if let Some(frame_id) = state.free_list.pop_front() {
            frame_id
        } else {
            let victim = state.replacer.evict().ok_or(BufferPoolError::NoFreeFrames)?;
            let old_page_id = self.frames[victim as usize].read().page_id;
            if state.meta[victim as usize].is_dirty {
                debug!("evicting dirty page {}, flushing", old_page_id);
                let page = self.frames[victim as usize].read();
                self.disk_manager.write_page(old_page_id, &page.data)?;
            }
            state.page_table.remove(&old_page_id);
            victim
        };

        {
            let mut page = self.frames[frame_id as usize].write();
            page.data.fill(0);
            page.page_id = page_id;
        }
        state.meta[frame_id as usize] = FrameMeta { pin_count: 1, is_dirty: false };
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
        Ok(frame_id)
    }

    /// Allocate the next page id, cache it in a frame and return it pinned
    pub fn new_page(&self) -> Result<(PageId, PagePtr), BufferPoolError> {
        let mut state = self.state.lock();
        let page_id = state.next_page_id;
        let frame_id = self.allocate_frame(&mut state, page_id)?;
        state.next_page_id += 1;
        Ok((page_id, self.frames[frame_id as usize].clone()))
    }

    /// Fetch a page, reading it from disk when not resident. The returned
    /// page is pinned; callers must pair this with `unpin_page` (guards do).
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.meta[frame_id as usize].pin_count += 1;
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            return Ok(self.frames[frame_id as usize].clone());
        }

        let frame_id = self.allocate_frame(&mut state, page_id)?;
        {
            let mut page = self.frames[frame_id as usize].write();
            self.disk_manager.read_page(page_id, &mut page.data)?;
        }
        Ok(self.frames[frame_id as usize].clone())
    }

    /// Drop one pin on a resident page, OR-ing in the dirty bit. The page
    /// becomes evictable when its pin count reaches zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotResident(page_id))?;
        let meta = &mut state.meta[frame_id as usize];
        if meta.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        meta.pin_count -= 1;
        meta.is_dirty |= is_dirty;
        if meta.pin_count == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
        Ok(())
    }

    fn flush_page_locked(&self, state: &mut PoolState, page_id: PageId) -> Result<(), BufferPoolError> {
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotResident(page_id))?;
        {
            let page = self.frames[frame_id as usize].read();
            self.disk_manager.write_page(page_id, &page.data)?;
        }
        state.meta[frame_id as usize].is_dirty = false;
        Ok(())
    }

    /// Write a resident page to disk and clear its dirty bit.
    /// Pin count and residency are unaffected.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        self.flush_page_locked(&mut state, page_id)
    }

    /// Flush every resident page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let page_ids: Vec<PageId> = state.page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page_locked(&mut state, page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and tell the disk manager to deallocate it.
    /// Succeeds trivially when the page is not resident; refuses when pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(()),
        };
        if state.meta[frame_id as usize].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        state.meta[frame_id as usize] = FrameMeta { pin_count: 0, is_dirty: false };
        self.frames[frame_id as usize].write().reset();
        state.free_list.push_back(frame_id);

        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Fetch a page wrapped in an unpin-on-drop guard
    pub fn fetch_page_basic(self: &Arc<Self>, page_id: PageId) -> Result<PageGuard, BufferPoolError> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self.clone(), page, page_id))
    }

    /// Fetch a page and take its shared latch
    pub fn fetch_page_read(self: &Arc<Self>, page_id: PageId) -> Result<ReadPageGuard, BufferPoolError> {
        let page = self.fetch_page(page_id)?;
        Ok(ReadPageGuard::new(PageGuard::new(self.clone(), page, page_id)))
    }

    /// Fetch a page and take its exclusive latch
    pub fn fetch_page_write(self: &Arc<Self>, page_id: PageId) -> Result<WritePageGuard, BufferPoolError> {
        let page = self.fetch_page(page_id)?;
        Ok(WritePageGuard::new(PageGuard::new(self.clone(), page, page_id)))
    }

    /// Allocate a new page wrapped in a guard
    pub fn new_page_guarded(self: &Arc<Self>) -> Result<(PageId, PageGuard), BufferPoolError> {
        let (page_id, page) = self.new_page()?;
        Ok((page_id, PageGuard::new(self.clone(), page, page_id)))
    }

    /// Allocate a new page and take its exclusive latch
    pub fn new_page_write(self: &Arc<Self>) -> Result<(PageId, WritePageGuard), BufferPoolError> {
        let (page_id, page) = self.new_page()?;
        Ok((page_id, WritePageGuard::new(PageGuard::new(self.clone(), page, page_id))))
    }

    #[cfg(test)]
    pub(crate) fn pin_count_of(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(state.meta[frame_id as usize].pin_count)
    }

    #[cfg(test)]
    pub(crate) fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }
}
