use std::sync::Arc;

use burrow::buffer::BufferPoolManager;
use burrow::index::BPlusTree;
use burrow::storage::disk::DiskManager;
use burrow::{PageId, RecordId, SlotId};

fn main() {
    tracing_subscriber::fmt::init();

    println!("Burrow - storage core of a disk-oriented database engine");
    println!("=========================================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    // Buffer pool with 16 frames and LRU-2 replacement
    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    // The header page anchors the tree's root
    let header_page_id = bpm.new_page().expect("Failed to allocate header page");
    bpm.unpin_page(header_page_id, false);

    let tree = BPlusTree::<u32>::new(header_page_id, Arc::clone(&bpm), 4, 4)
        .expect("Failed to create index");
    println!("Created B+ tree index on header page {}", header_page_id);

    // Insert a handful of keys, enough to force splits at max size 4
    for key in [8u32, 3, 11, 1, 6, 14, 4, 9, 12, 2] {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        tree.insert(&key, rid).expect("Insert failed");
        println!("Inserted key {}", key);
    }

    println!("\nPoint lookups:");
    for key in [6u32, 13] {
        match tree.get_value(&key).expect("Lookup failed") {
            Some(rid) => println!("  key {} -> {:?}", key, rid),
            None => println!("  key {} -> not found", key),
        }
    }

    println!("\nForward scan:");
    let mut iter = tree.begin().expect("Failed to build iterator");
    while let Some((key, rid)) = iter.entry() {
        println!("  {} -> page {}", key, rid.page_id);
        iter.advance().expect("Iterator advance failed");
    }

    tree.remove(&8).expect("Remove failed");
    println!("\nRemoved key 8; lookup now: {:?}", tree.get_value(&8).unwrap());

    bpm.flush_all_pages().expect("Flush failed");
    println!("Flushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
