use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::Frame;

type FrameDataReadGuard = RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>;
type FrameDataWriteGuard = RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>;

/// Shared plumbing of all three guard flavors: the pinned frame, a handle
/// back into the pool for the final unpin, and the dirty flag accumulated
/// through mutable access.
struct GuardCore {
    page_id: PageId,
    frame: Arc<Frame>,
    pool: Arc<PoolState>,
    is_dirty: bool,
}

impl GuardCore {
    fn release(self) {
        self.pool.unpin_page(self.page_id, self.is_dirty);
    }
}

/// RAII handle owning only a pin on a frame. Byte access is scoped: each
/// closure call takes the frame latch for its own duration.
pub struct PageGuard {
    core: Option<GuardCore>,
}

impl PageGuard {
    pub(crate) fn new(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolState>) -> Self {
        Self {
            core: Some(GuardCore {
                page_id,
                frame,
                pool,
                is_dirty: false,
            }),
        }
    }

    fn core(&self) -> &GuardCore {
        self.core.as_ref().expect("page guard already released")
    }

    pub fn page_id(&self) -> PageId {
        self.core().page_id
    }

    /// Reads the page bytes under a transient shared latch.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.core().frame.data.read();
        f(&data[..])
    }

    /// Mutates the page bytes under a transient exclusive latch and marks
    /// the guard dirty.
    pub fn with_data_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let core = self.core.as_mut().expect("page guard already released");
        core.is_dirty = true;
        let mut data = core.frame.data.write();
        f(&mut data[..])
    }

    /// Converts this guard into a read guard, keeping the pin and taking a
    /// shared latch.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let core = self.core.take().expect("page guard already released");
        ReadPageGuard::from_core(core)
    }

    /// Converts this guard into a write guard, keeping the pin and taking an
    /// exclusive latch.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let core = self.core.take().expect("page guard already released");
        WritePageGuard::from_core(core)
    }

    /// Releases the guard eagerly.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            core.release();
        }
    }
}

/// RAII handle owning a pin and a shared latch on a frame.
pub struct ReadPageGuard {
    core: Option<GuardCore>,
    /// Shared latch on the page data, held for the guard's lifetime
    data: Option<FrameDataReadGuard>,
}

impl ReadPageGuard {
    pub(crate) fn latch(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolState>) -> Self {
        Self::from_core(GuardCore {
            page_id,
            frame,
            pool,
            is_dirty: false,
        })
    }

    fn from_core(core: GuardCore) -> Self {
        let data = core.frame.data.read();
        // Safety: the latch borrows from the frame, which the Arc in `core`
        // keeps alive for at least as long as this guard.
        let data: FrameDataReadGuard = unsafe { std::mem::transmute(data) };

        Self {
            core: Some(core),
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.as_ref().expect("read guard already released").page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().expect("read guard already released")[..]
    }

    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // latch first, then pin
        self.data.take();
        if let Some(core) = self.core.take() {
            core.release();
        }
    }
}

/// RAII handle owning a pin and an exclusive latch on a frame. Mutable
/// access marks the page dirty, which the drop path reports to the pool.
pub struct WritePageGuard {
    core: Option<GuardCore>,
    /// Exclusive latch on the page data, held for the guard's lifetime
    data: Option<FrameDataWriteGuard>,
}

impl WritePageGuard {
    pub(crate) fn latch(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolState>) -> Self {
        Self::from_core(GuardCore {
            page_id,
            frame,
            pool,
            is_dirty: false,
        })
    }

    fn from_core(core: GuardCore) -> Self {
        let data = core.frame.data.write();
        // Safety: as for ReadPageGuard - the Arc in `core` outlives the latch.
        let data: FrameDataWriteGuard = unsafe { std::mem::transmute(data) };

        Self {
            core: Some(core),
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.as_ref().expect("write guard already released").page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().expect("write guard already released")[..]
    }

    /// Mutable view of the page bytes; marks the guard dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let core = self.core.as_mut().expect("write guard already released");
        core.is_dirty = true;
        &mut self.data.as_mut().expect("write guard already released")[..]
    }

    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // latch first, then pin
        self.data.take();
        if let Some(core) = self.core.take() {
            core.release();
        }
    }
}
