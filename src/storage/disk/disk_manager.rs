use std::fs::{File, OpenOptions};
use std::io::{Read, Write, Seek, SeekFrom};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;
use log::debug;

use crate::common::types::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager handles the actual block-level I/O against the database file.
/// Page `n` lives at byte offset `n * PAGE_SIZE`.
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    /// Open (or create) the database file at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
        })
    }

    /// Read a page from disk into the destination buffer.
    /// Reads past the current end of file yield a zeroed page, so a freshly
    /// allocated page id is readable before its first flush.
    pub fn read_page(&self, page_id: PageId, dst: &mut [u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.db_file.lock();

        let file_size = file.metadata()?.len();
        if offset >= file_size {
            dst.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)?;
        Ok(())
    }

    /// Write a page buffer to disk
    pub fn write_page(&self, page_id: PageId, src: &[u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(src)?;
        file.flush()?;
        Ok(())
    }

    /// Release a page's on-disk storage. The file format keeps no free map,
    /// so this only records the fact; the id is never handed out again by
    /// the buffer pool's monotonic allocator.
    pub fn deallocate_page(&self, page_id: PageId) {
        debug!("deallocate page {}", page_id);
    }

    /// Number of whole pages currently stored in the file
    pub fn page_capacity(&self) -> Result<PageId, DiskManagerError> {
        let file = self.db_file.lock();
        let len = file.metadata()?.len();
        Ok((len / PAGE_SIZE as u64) as PageId)
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path().join("test.db")).unwrap();

        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;
        dm.write_page(3, &page).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(3, &mut out).unwrap();
        assert_eq!(out[0], 0xAB);
        assert_eq!(out[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_read_past_eof_is_zeroed() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path().join("test.db")).unwrap();

        let mut out = [0xFFu8; PAGE_SIZE];
        dm.read_page(42, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path().join("test.db")).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        assert!(dm.read_page(INVALID_PAGE_ID, &mut buf).is_err());
        assert!(dm.write_page(INVALID_PAGE_ID, &buf).is_err());
    }
}
