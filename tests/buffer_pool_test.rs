//! Integration tests for the buffer pool manager

use std::sync::Arc;

use burrow::buffer::BufferPoolManager;
use burrow::common::PAGE_SIZE;
use burrow::storage::disk::DiskManager;
use burrow::{BurrowError, PageId};

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, 2, dm);
    (bpm, temp_file)
}

#[test]
fn test_new_page_pins_frame() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap();
    assert_eq!(page_id, PageId::new(0));
    assert_eq!(bpm.get_pin_count(page_id), Some(1));
    assert_eq!(bpm.free_frame_count(), 9);

    assert!(bpm.unpin_page(page_id, false));
    assert_eq!(bpm.get_pin_count(page_id), Some(0));

    // a second unpin has nothing to release
    assert!(!bpm.unpin_page(page_id, false));
}

#[test]
fn test_write_then_read_back() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap();
    bpm.unpin_page(page_id, false);

    {
        let mut guard = bpm.fetch_write(page_id).unwrap();
        guard.data_mut()[0] = 42;
        guard.data_mut()[PAGE_SIZE - 1] = 7;
    }

    let guard = bpm.fetch_read(page_id).unwrap();
    assert_eq!(guard.data()[0], 42);
    assert_eq!(guard.data()[PAGE_SIZE - 1], 7);
}

#[test]
fn test_pool_exhaustion() {
    let (bpm, _temp) = create_bpm(5);

    // Pin five pages; the pool is now exhausted
    let pages: Vec<_> = (0..5).map(|_| bpm.new_page().unwrap()).collect();
    assert!(matches!(bpm.new_page(), Err(BurrowError::PoolExhausted)));
    assert!(matches!(
        bpm.fetch_read(PageId::new(99)),
        Err(BurrowError::PoolExhausted)
    ));

    // Releasing one pin frees one frame
    bpm.unpin_page(pages[0], false);
    let extra = bpm.new_page().unwrap();
    assert_eq!(extra, PageId::new(5));
}

#[test]
fn test_eviction_round_trips_through_disk() {
    let (bpm, _temp) = create_bpm(3);

    let pages: Vec<_> = (0..10u32)
        .map(|i| {
            let pid = bpm.new_page().unwrap();
            {
                let mut guard = bpm.fetch_write(pid).unwrap();
                guard.data_mut()[0] = i as u8 + 1;
            }
            bpm.unpin_page(pid, false);
            pid
        })
        .collect();

    // Everything beyond the pool size was evicted and must reload cleanly
    for (i, &pid) in pages.iter().enumerate() {
        let guard = bpm.fetch_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8 + 1, "page {} lost its bytes", pid);
    }
}

#[test]
fn test_dirty_flag_is_sticky() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap();
    // Mark dirty through unpin even though nothing was written yet
    assert!(bpm.unpin_page(page_id, true));

    // A clean unpin afterwards must not clear the flag; flushing must still
    // write the page out
    let guard = bpm.fetch_basic(page_id).unwrap();
    drop(guard);

    let writes_before = bpm.disk_manager().num_writes();
    bpm.flush_page(page_id).unwrap();
    assert_eq!(bpm.disk_manager().num_writes(), writes_before + 1);
}

#[test]
fn test_delete_page() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap();

    // Deletion must fail while the page is pinned
    assert!(matches!(
        bpm.delete_page(page_id),
        Err(BurrowError::PageStillPinned(_))
    ));

    bpm.unpin_page(page_id, false);
    assert!(bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.get_pin_count(page_id), None);
    assert_eq!(bpm.free_frame_count(), 10);

    // Deleting a page that is not resident succeeds
    assert!(bpm.delete_page(PageId::new(500)).unwrap());
}

#[test]
fn test_flush_all_pages_persists() {
    let temp_file = NamedTempFile::new().unwrap();
    let pages: Vec<PageId>;

    {
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        pages = (0..5u32)
            .map(|i| {
                let pid = bpm.new_page().unwrap();
                {
                    let mut guard = bpm.fetch_write(pid).unwrap();
                    guard.data_mut()[10] = i as u8 + 1;
                }
                bpm.unpin_page(pid, false);
                pid
            })
            .collect();

        bpm.flush_all_pages().unwrap();
    }

    // A fresh pool over the same file observes the same bytes
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(10, 2, dm);
    for (i, &pid) in pages.iter().enumerate() {
        let guard = bpm.fetch_read(pid).unwrap();
        assert_eq!(guard.data()[10], i as u8 + 1);
    }
}

#[test]
fn test_page_id_allocation_resumes_after_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);
        for _ in 0..3 {
            let pid = bpm.new_page().unwrap();
            bpm.unpin_page(pid, true);
        }
        bpm.flush_all_pages().unwrap();
    }

    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(10, 2, dm);
    let pid = bpm.new_page().unwrap();
    assert_eq!(pid, PageId::new(3));
}

#[test]
fn test_concurrent_fetches_balance_pins() {
    use std::thread;

    let (bpm, _temp) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_id = bpm.new_page().unwrap();
    bpm.unpin_page(page_id, false);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for _ in 0..50 {
                    let guard = bpm.fetch_read(page_id).unwrap();
                    assert_eq!(guard.page_id(), page_id);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}
