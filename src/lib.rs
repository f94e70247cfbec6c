//! Burrow - the storage core of a small disk-oriented relational database
//! engine.
//!
//! The crate has two tightly coupled subsystems:
//!
//! - **Buffer pool** (`buffer`): keeps a bounded working set of fixed-size
//!   pages in memory.
//!   - `BufferPoolManager`: owns the frames, the page table and the free
//!     list, and hands out RAII page guards
//!   - `LruKReplacer`: LRU-K eviction policy
//!   - `Frame`: per-frame metadata plus the latched page buffer
//!   - `PageGuard`/`ReadPageGuard`/`WritePageGuard`: scoped pin + latch
//!
//! - **B+ tree index** (`index`): a concurrent B+ tree built exclusively on
//!   page guards, with latch-crabbing descents, splits on insert,
//!   borrow/merge on remove and forward leaf iteration.
//!
//! The disk itself sits behind `storage::disk`:
//!   - `DiskManager`: reads and writes pages of a single database file
//!   - `DiskScheduler`: background worker that serializes page I/O
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use burrow::buffer::BufferPoolManager;
//! use burrow::index::BPlusTree;
//! use burrow::storage::disk::DiskManager;
//! use burrow::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! // The header page stores the tree's root page id
//! let header_page_id = bpm.new_page().unwrap();
//! bpm.unpin_page(header_page_id, false);
//!
//! let tree = BPlusTree::<u32>::new(header_page_id, Arc::clone(&bpm), 64, 64).unwrap();
//! tree.insert(&42, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert!(tree.get_value(&42).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BurrowError, PageId, RecordId, Result, SlotId};
