use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{BurrowError, PageId, Result, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from a single
/// database file. Pages live at byte offset `page_id * PAGE_SIZE`.
///
/// Page id allocation is not the disk manager's job - the buffer pool hands
/// out monotonically increasing ids and only tells the disk manager when a
/// page is given back via [`deallocate_page`](DiskManager::deallocate_page).
pub struct DiskManager {
    /// The backing database file, guarded for exclusive cursor access
    file: Mutex<File>,
    /// Path of the database file
    db_path: PathBuf,
    /// Number of pages the file currently covers
    num_pages: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
    /// Number of pages handed back through the deallocation hook
    num_deallocations: AtomicU32,
    /// Set once shutdown() has run
    shut_down: AtomicBool,
}

impl DiskManager {
    /// Opens the database file at the given path, creating it if missing.
    /// The page count is derived from the current file length.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_deallocations: AtomicU32::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// Reads past the end of the file are zero-filled.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        debug_assert!(!self.shut_down.load(Ordering::Acquire), "store is shut down");
        if page_id.as_u32() == u32::MAX {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        debug_assert!(!self.shut_down.load(Ordering::Acquire), "store is shut down");
        if page_id.as_u32() == u32::MAX {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);

        // Track file growth so a reopened manager resumes allocation past us
        let covered = page_id.as_u32() + 1;
        self.num_pages.fetch_max(covered, Ordering::Relaxed);
        Ok(())
    }

    /// Hook called when the buffer pool deletes a page. The id is not reused;
    /// this only keeps the deallocation counter so workloads can be audited
    /// for page leaks.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        self.num_deallocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flushes all buffered file data to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    /// Flushes and marks the backing store closed. Further I/O still works
    /// on the open handle but is not expected after this call.
    pub fn shutdown(&self) -> Result<()> {
        self.sync()?;
        self.shut_down.store(true, Ordering::Release);
        Ok(())
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn num_deallocations(&self) -> u32 {
        self.num_deallocations.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_manager_new() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let dm = DiskManager::new(&db_path).unwrap();

        assert!(db_path.exists());
        assert_eq!(dm.num_pages(), 0);
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("rw.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let page_id = PageId::new(0);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_read_past_eof_zero_fills() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("eof.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(PageId::new(9), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("persist.db");

        {
            let dm = DiskManager::new(&db_path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(PageId::new(1), &data).unwrap();
            dm.shutdown().unwrap();
        }

        {
            let dm = DiskManager::new(&db_path).unwrap();
            assert_eq!(dm.num_pages(), 2);

            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(1), &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }
}
