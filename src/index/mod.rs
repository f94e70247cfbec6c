pub mod btree;
pub mod btree_iterator;
pub mod btree_page;
pub mod key;

pub use btree::BPlusTree;
pub use btree_iterator::TreeIterator;
pub use btree_page::{HeaderMut, HeaderRef, InternalMut, InternalRef, LeafMut, LeafRef, NodeKind};
pub use key::IndexKey;
