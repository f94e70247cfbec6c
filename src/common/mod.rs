pub mod config;
pub mod error;
pub mod types;

pub use config::{DEFAULT_POOL_SIZE, DEFAULT_REPLACER_K, INVALID_FRAME_ID, INVALID_PAGE_ID, PAGE_SIZE};
pub use error::{BurrowError, Result};
pub use types::{FrameId, PageId, RecordId, SlotId, Timestamp};
