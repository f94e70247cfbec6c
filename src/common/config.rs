use super::types::{FrameId, PageId};

/// Fixed page size in bytes, the unit of disk I/O and of buffering.
pub const PAGE_SIZE: usize = 4096;

/// The "no page" sentinel: never allocated, never resident. Leaves use it
/// to terminate the sibling chain and the header page stores it while the
/// tree is empty.
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// The "no frame" sentinel.
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Replacer history depth to use when the embedder has no preference.
pub const DEFAULT_REPLACER_K: usize = 2;

/// Buffer pool frame count to use when the embedder has no preference.
pub const DEFAULT_POOL_SIZE: usize = 16;
