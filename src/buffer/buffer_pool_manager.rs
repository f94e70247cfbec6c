use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{BurrowError, FrameId, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruKReplacer, PageGuard, ReadPageGuard, WritePageGuard};

/// Bookkeeping serialized under the pool's single mutex.
struct PoolTables {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Next page ID to hand out
    next_page_id: u32,
}

/// State shared between the manager and the guards it issues.
pub(crate) struct PoolState {
    frames: Vec<Arc<Frame>>,
    tables: Mutex<PoolTables>,
    replacer: LruKReplacer,
    scheduler: DiskScheduler,
}

impl PoolState {
    /// Decrements a page's pin count, ORs in the dirty flag and marks the
    /// frame evictable when the count reaches zero. Returns false when the
    /// page is not resident or was not pinned.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let tables = self.tables.lock();

        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }
}

/// BufferPoolManager mediates every access to on-disk pages. It keeps a
/// fixed number of frames in memory, maps resident pages to frames, evicts
/// cold frames with an LRU-K policy and hands out RAII guards that scope
/// the pin (and, for read/write guards, the frame latch).
///
/// Page ids are allocated here from a monotonic counter seeded with the
/// disk file's current page count.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// First page id this pool instance may allocate
    base_page_id: u32,
    state: Arc<PoolState>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for
    /// LRU-K, and disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let base_page_id = disk_manager.num_pages();

        let state = Arc::new(PoolState {
            frames,
            tables: Mutex::new(PoolTables {
                page_table: HashMap::new(),
                free_list,
                next_page_id: base_page_id,
            }),
            replacer: LruKReplacer::new(k, pool_size),
            scheduler: DiskScheduler::new(disk_manager),
        });

        Self {
            pool_size,
            base_page_id,
            state,
        }
    }

    /// Allocates a fresh page and pins it into a frame (pin count 1).
    /// The caller owns the pin and must balance it with `unpin_page` or by
    /// using `new_page_guarded` instead.
    pub fn new_page(&self) -> Result<PageId> {
        let mut tables = self.state.tables.lock();
        let frame_id = self.acquire_frame(&mut tables)?;

        let page_id = PageId::new(tables.next_page_id);
        tables.next_page_id += 1;

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();

        tables.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        debug!(page_id = page_id.as_u32(), frame_id = frame_id.as_u32(), "allocated new page");
        Ok(page_id)
    }

    /// Like `new_page`, but the pin is owned by the returned guard.
    pub fn new_page_guarded(&self) -> Result<PageGuard> {
        let page_id = self.new_page()?;
        let frame = {
            let tables = self.state.tables.lock();
            let frame_id = tables.page_table[&page_id];
            Arc::clone(&self.state.frames[frame_id.as_usize()])
        };
        Ok(PageGuard::new(page_id, frame, Arc::clone(&self.state)))
    }

    /// Fetches a page holding only a pin.
    pub fn fetch_basic(&self, page_id: PageId) -> Result<PageGuard> {
        let frame = self.pin_frame(page_id)?;
        Ok(PageGuard::new(page_id, frame, Arc::clone(&self.state)))
    }

    /// Fetches a page for shared access. The pin is taken under the pool
    /// mutex; the latch only after the mutex is released.
    pub fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.pin_frame(page_id)?;
        Ok(ReadPageGuard::latch(page_id, frame, Arc::clone(&self.state)))
    }

    /// Fetches a page for exclusive access.
    pub fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.pin_frame(page_id)?;
        Ok(WritePageGuard::latch(page_id, frame, Arc::clone(&self.state)))
    }

    /// Decrements a page's pin count; the dirty flag is sticky until flush.
    /// Returns false when the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page to disk unconditionally and clears its dirty
    /// bit. Returns Ok(false) if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let tables = self.state.tables.lock();
        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.state.scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let tables = self.state.tables.lock();

        for (&page_id, &frame_id) in tables.page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.state.scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Drops a page from the pool and tells the disk manager to deallocate
    /// its id. Deleting a page that is not resident succeeds; deleting a
    /// pinned page fails.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut tables = self.state.tables.lock();

        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            drop(tables);
            self.disk_manager().deallocate_page(page_id)?;
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Err(BurrowError::PageStillPinned(page_id));
        }

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.state.scheduler.schedule_write_sync(page_id, &data)?;
        }

        self.state.replacer.remove(frame_id)?;
        tables.page_table.remove(&page_id);
        frame.reset();
        tables.free_list.push_back(frame_id);

        drop(tables);
        self.disk_manager().deallocate_page(page_id)?;

        debug!(page_id = page_id.as_u32(), "deleted page");
        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let tables = self.state.tables.lock();

        tables
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.tables.lock().free_list.len()
    }

    /// Number of page ids this pool instance has handed out.
    pub fn allocated_page_count(&self) -> u32 {
        self.state.tables.lock().next_page_id - self.base_page_id
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.state.scheduler.disk_manager()
    }

    /// Pins the frame holding `page_id`, reading the page from disk into a
    /// freshly acquired frame on a miss.
    fn pin_frame(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if page_id == INVALID_PAGE_ID {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let mut tables = self.state.tables.lock();

        if let Some(&frame_id) = tables.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut tables)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.state.scheduler.schedule_read_sync(page_id, &mut data) {
            tables.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        tables.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Arc::clone(frame))
    }

    /// Produces an empty frame, preferring the free list and falling back to
    /// eviction. Dirty victims are written back first.
    fn acquire_frame(&self, tables: &mut PoolTables) -> Result<FrameId> {
        if let Some(frame_id) = tables.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Err(BurrowError::PoolExhausted);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.state
                .scheduler
                .schedule_write_sync(old_page_id, &data)?;
        }

        tables.page_table.remove(&old_page_id);
        frame.reset();

        debug!(
            frame_id = frame_id.as_u32(),
            old_page_id = old_page_id.as_u32(),
            "evicted frame"
        );
        Ok(frame_id)
    }
}
