use std::sync::Arc;
use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use super::page as table_page;
use super::tuple::{Tuple, TupleMeta};

#[derive(Error, Debug)]
pub enum TableHeapError {
    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Tuple encoding error: {0}")]
    EncodingError(#[from] bincode::Error),

    #[error("Tuple of {0} bytes does not fit in a page")]
    TupleTooLarge(usize),

    #[error("No tuple at {0}")]
    InvalidRid(Rid),
}

/// Unordered tuple storage: a forward-linked chain of slotted pages.
/// Inserts append to the tail page; deletes are tombstones in the slot
/// array, so record ids stay stable.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, TableHeapError> {
        let (first_page_id, mut guard) = buffer_pool.new_page_write()?;
        table_page::init_page(guard.data_mut());
        drop(guard);

        Ok(Self {
            buffer_pool,
            first_page_id,
            last_page_id: Mutex::new(first_page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, growing the page chain when the tail is full
    pub fn insert_tuple(&self, meta: TupleMeta, tuple: &Tuple) -> Result<Rid, TableHeapError> {
        let payload = tuple.to_bytes()?;
        if payload.len() + table_page::TABLE_PAGE_HEADER_SIZE + table_page::SLOT_SIZE
            > crate::common::types::PAGE_SIZE
        {
            return Err(TableHeapError::TupleTooLarge(payload.len()));
        }

        let mut last = self.last_page_id.lock();
        let mut guard = self.buffer_pool.fetch_page_write(*last)?;
        if let Some(slot) = table_page::insert_record(guard.data_mut(), &payload, meta) {
            return Ok(Rid::new(*last, slot));
        }

        // Tail is full: chain a fresh page and land the tuple there.
        let (new_page_id, mut new_guard) = self.buffer_pool.new_page_write()?;
        table_page::init_page(new_guard.data_mut());
        table_page::set_next_page_id(guard.data_mut(), new_page_id);
        drop(guard);

        let slot = table_page::insert_record(new_guard.data_mut(), &payload, meta)
            .ok_or(TableHeapError::TupleTooLarge(payload.len()))?;
        *last = new_page_id;
        Ok(Rid::new(new_page_id, slot))
    }

    /// Fetch a tuple and its metadata by record id
    pub fn get_tuple(&self, rid: Rid) -> Result<(TupleMeta, Tuple), TableHeapError> {
        let guard = self.buffer_pool.fetch_page_read(rid.page_id)?;
        let (meta, payload) = table_page::record(guard.data(), rid.slot)
            .ok_or(TableHeapError::InvalidRid(rid))?;
        Ok((meta, Tuple::from_bytes(payload)?))
    }

    /// Flip a tuple's metadata in place (tombstoning and undeleting)
    pub fn update_tuple_meta(&self, rid: Rid, meta: TupleMeta) -> Result<(), TableHeapError> {
        let mut guard = self.buffer_pool.fetch_page_write(rid.page_id)?;
        if !table_page::set_meta(guard.data_mut(), rid.slot, meta) {
            return Err(TableHeapError::InvalidRid(rid));
        }
        Ok(())
    }

    /// Cursor over every slot in the heap, tombstones included
    pub fn iter(self: &Arc<Self>) -> TableIterator {
        TableIterator {
            heap: self.clone(),
            page_id: self.first_page_id,
            slot: 0,
        }
    }
}

/// Walks the page chain slot by slot
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: PageId,
    slot: u32,
}

impl TableIterator {
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(Rid, TupleMeta, Tuple)>, TableHeapError> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return Ok(None);
            }
            let guard = self.heap.buffer_pool.fetch_page_read(self.page_id)?;
            if self.slot < table_page::record_count(guard.data()) {
                let rid = Rid::new(self.page_id, self.slot);
                let (meta, payload) = match table_page::record(guard.data(), self.slot) {
                    Some(entry) => entry,
                    None => return Err(TableHeapError::InvalidRid(rid)),
                };
                let tuple = Tuple::from_bytes(payload)?;
                self.slot += 1;
                return Ok(Some((rid, meta, tuple)));
            }
            self.page_id = table_page::next_page_id(guard.data());
            self.slot = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::value::DataValue;
    use crate::storage::disk::DiskManager;
    use tempfile::TempDir;

    fn test_heap() -> (TempDir, Arc<BufferPoolManager>, Arc<TableHeap>) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path().join("test.db")).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, 2, disk));
        let heap = Arc::new(TableHeap::new(bpm.clone()).unwrap());
        (dir, bpm, heap)
    }

    fn row(id: i64) -> Tuple {
        Tuple::new(vec![DataValue::Integer(id), DataValue::Text(format!("row-{id}"))])
    }

    #[test]
    fn test_insert_and_get() {
        let (_dir, _bpm, heap) = test_heap();
        let rid = heap.insert_tuple(TupleMeta::live(), &row(1)).unwrap();
        let (meta, tuple) = heap.get_tuple(rid).unwrap();
        assert!(!meta.is_deleted);
        assert_eq!(tuple, row(1));
    }

    #[test]
    fn test_scan_spans_pages() {
        let (_dir, _bpm, heap) = test_heap();
        let mut rids = Vec::new();
        for i in 0..500 {
            rids.push(heap.insert_tuple(TupleMeta::live(), &row(i)).unwrap());
        }
        // 500 rows cannot fit one page.
        assert!(rids.iter().any(|r| r.page_id != rids[0].page_id));

        let mut it = heap.iter();
        let mut seen = 0;
        while let Some((rid, meta, tuple)) = it.next().unwrap() {
            assert_eq!(rid, rids[seen]);
            assert!(!meta.is_deleted);
            assert_eq!(tuple, row(seen as i64));
            seen += 1;
        }
        assert_eq!(seen, 500);
    }

    #[test]
    fn test_tombstoning() {
        let (_dir, _bpm, heap) = test_heap();
        let rid0 = heap.insert_tuple(TupleMeta::live(), &row(0)).unwrap();
        let rid1 = heap.insert_tuple(TupleMeta::live(), &row(1)).unwrap();

        heap.update_tuple_meta(rid0, TupleMeta::deleted()).unwrap();
        assert!(heap.get_tuple(rid0).unwrap().0.is_deleted);
        assert!(!heap.get_tuple(rid1).unwrap().0.is_deleted);

        // The tombstoned slot still shows up in a raw scan.
        let mut it = heap.iter();
        let mut metas = Vec::new();
        while let Some((_, meta, _)) = it.next().unwrap() {
            metas.push(meta.is_deleted);
        }
        assert_eq!(metas, vec![true, false]);
    }

    #[test]
    fn test_invalid_rid() {
        let (_dir, _bpm, heap) = test_heap();
        heap.insert_tuple(TupleMeta::live(), &row(0)).unwrap();
        let bogus = Rid::new(heap.first_page_id(), 57);
        assert!(matches!(
            heap.get_tuple(bogus),
            Err(TableHeapError::InvalidRid(_))
        ));
    }
}
