use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{BurrowError, PageId, RecordId, Result, INVALID_PAGE_ID};

use super::btree_iterator::TreeIterator;
use super::btree_page::{
    node_kind, HeaderMut, HeaderRef, InternalMut, InternalRef, LeafMut, LeafRef, NodeKind,
    Rebalance,
};
use super::key::IndexKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescentMode {
    Insert,
    Remove,
}

/// Adjacent-sibling hint recorded per level during a remove descent, so
/// rebalancing does not need a second traversal. `page_id` is invalid at
/// the root level (no sibling exists).
#[derive(Debug, Clone, Copy)]
struct SiblingHint {
    page_id: PageId,
    /// Index of the followed child in its parent
    index: usize,
    /// Whether the hinted sibling sits to the right of the followed child
    is_right: bool,
}

impl SiblingHint {
    fn none() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            index: 0,
            is_right: false,
        }
    }
}

/// Guards accumulated by a write descent. `write_set` is the unsafe suffix
/// of the path from the root; the header guard is present exactly while the
/// root itself may still change.
struct WriteContext {
    header: Option<WritePageGuard>,
    write_set: VecDeque<WritePageGuard>,
    hints: Vec<SiblingHint>,
}

/// A concurrent B+ tree index mapping fixed-width keys to RecordIds.
///
/// The tree lives entirely in buffer-pool pages and reaches them only
/// through page guards. A distinguished header page stores the current root
/// page id; it participates in the crabbed write set so root changes happen
/// under its latch.
pub struct BPlusTree<K: IndexKey> {
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: u16,
    internal_max_size: u16,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Creates a tree on the given header page, resetting its root to
    /// invalid (an empty tree).
    pub fn new(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: u16,
        internal_max_size: u16,
    ) -> Result<Self> {
        assert!(leaf_max_size > 2 && internal_max_size > 2, "max sizes must exceed 2");

        {
            let mut header_guard = bpm.fetch_write(header_page_id)?;
            HeaderMut::new(header_guard.data_mut()).init();
        }

        Ok(Self {
            header_page_id,
            bpm,
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        })
    }

    /// Attaches to a tree whose header page already exists on disk.
    pub fn open(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: u16,
        internal_max_size: u16,
    ) -> Result<Self> {
        assert!(leaf_max_size > 2 && internal_max_size > 2, "max sizes must exceed 2");

        Ok(Self {
            header_page_id,
            bpm,
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        })
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn root_page_id(&self) -> Result<PageId> {
        let guard = self.bpm.fetch_read(self.header_page_id)?;
        Ok(HeaderRef::new(guard.data()).root_page_id())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root_page_id()? == INVALID_PAGE_ID)
    }

    /// Point lookup. Read-latch-crabs down to the leaf that could hold the
    /// key; at most two node guards are held at any moment.
    pub fn get_value(&self, key: &K) -> Result<Option<RecordId>> {
        let Some(guard) = self.find_leaf_read(Some(key))? else {
            return Ok(None);
        };
        let leaf = LeafRef::<K>::new(guard.data());
        Ok(leaf.lookup(key))
    }

    /// Inserts a key/value pair. Returns Ok(false) when the key already
    /// exists (keys are unique). May grow the tree by one level.
    pub fn insert(&self, key: &K, value: RecordId) -> Result<bool> {
        let mut ctx = loop {
            {
                let mut header_guard = self.bpm.fetch_write(self.header_page_id)?;
                if HeaderRef::new(header_guard.data()).root_page_id() == INVALID_PAGE_ID {
                    let leaf_id = self.new_leaf_page()?;
                    self.bpm.unpin_page(leaf_id, true);
                    HeaderMut::new(header_guard.data_mut()).set_root_page_id(leaf_id);
                    debug!(root = leaf_id.as_u32(), "started new tree");
                }
            }

            let ctx = self.find_leaf_write(key, DescentMode::Insert)?;
            // a concurrent remove may have emptied the tree in between
            if !ctx.write_set.is_empty() {
                break ctx;
            }
        };

        let inserted = {
            let guard = ctx.write_set.back_mut().expect("descent ends at a leaf");
            let mut leaf = LeafMut::<K>::new(guard.data_mut());
            leaf.insert(key, value)
        };
        if !inserted {
            return Ok(false);
        }

        self.propagate_split(&mut ctx)?;
        Ok(true)
    }

    /// Removes a key. Absent keys are a no-op. Underflowing nodes borrow
    /// from or merge with the sibling recorded during descent; pages that
    /// become unreferenced are deleted from the buffer pool.
    pub fn remove(&self, key: &K) -> Result<()> {
        if self.get_value(key)?.is_none() {
            return Ok(());
        }

        let mut ctx = self.find_leaf_write(key, DescentMode::Remove)?;
        if ctx.write_set.is_empty() {
            return Ok(());
        }

        {
            let guard = ctx.write_set.back_mut().expect("descent ends at a leaf");
            let mut leaf = LeafMut::<K>::new(guard.data_mut());
            leaf.remove(key);
        }

        let mut orphans = Vec::new();
        self.rebalance_after_remove(&mut ctx, &mut orphans)?;
        drop(ctx);

        for page_id in orphans {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<TreeIterator<K>> {
        let Some(guard) = self.find_leaf_read(None)? else {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        };
        let page_id = guard.page_id();
        drop(guard);
        TreeIterator::new(Arc::clone(&self.bpm), page_id, 0)
    }

    /// Iterator positioned at exactly `key`; the end iterator when absent.
    pub fn begin_at(&self, key: &K) -> Result<TreeIterator<K>> {
        if self.get_value(key)?.is_none() {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        }

        let Some(guard) = self.find_leaf_read(Some(key))? else {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        };
        let leaf = LeafRef::<K>::new(guard.data());
        let Some(index) = leaf.index_of(key) else {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        };
        let page_id = guard.page_id();
        drop(guard);
        TreeIterator::new(Arc::clone(&self.bpm), page_id, index)
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> TreeIterator<K> {
        TreeIterator::end(Arc::clone(&self.bpm))
    }

    /// Read descent: latch the child, then release the parent. With `key`
    /// absent, follows the leftmost child at every level.
    fn find_leaf_read(&self, key: Option<&K>) -> Result<Option<ReadPageGuard>> {
        let header_guard = self.bpm.fetch_read(self.header_page_id)?;
        let mut page_id = HeaderRef::new(header_guard.data()).root_page_id();
        let mut parent = header_guard;

        while page_id != INVALID_PAGE_ID {
            let guard = self.bpm.fetch_read(page_id)?;
            drop(parent);

            match Self::kind_of(guard.data())? {
                NodeKind::Leaf => return Ok(Some(guard)),
                NodeKind::Internal => {
                    let node = InternalRef::<K>::new(guard.data());
                    page_id = match key {
                        Some(key) => node.lookup_child(key).1,
                        None => node.child_at(0),
                    };
                }
            }
            parent = guard;
        }

        Ok(None)
    }

    /// Write descent with crabbing: ancestors (header included) are released
    /// as soon as the current node is safe for the given operation. Remove
    /// descents additionally record a sibling hint per level.
    fn find_leaf_write(&self, key: &K, mode: DescentMode) -> Result<WriteContext> {
        let header_guard = self.bpm.fetch_write(self.header_page_id)?;
        let mut page_id = HeaderRef::new(header_guard.data()).root_page_id();

        let mut ctx = WriteContext {
            header: Some(header_guard),
            write_set: VecDeque::new(),
            hints: vec![SiblingHint::none()],
        };

        while page_id != INVALID_PAGE_ID {
            let mut guard = self.bpm.fetch_write(page_id)?;

            if Self::kind_of(guard.data())? == NodeKind::Leaf {
                ctx.write_set.push_back(guard);
                break;
            }

            let (safe, rewrite_low_key, child_id, hint) = {
                let node = InternalRef::<K>::new(guard.data());
                let size = node.size() as usize;

                let safe = match mode {
                    DescentMode::Insert => node.size() + 1 < node.max_size(),
                    DescentMode::Remove => node.size() > node.min_size(),
                };
                let rewrite_low_key = mode == DescentMode::Insert && *key < node.key_at(0);

                let (child_index, child_id) = node.lookup_child(key);
                let hint = match mode {
                    DescentMode::Insert => None,
                    DescentMode::Remove => Some(if child_index == size - 1 {
                        if child_index == 0 {
                            SiblingHint::none()
                        } else {
                            SiblingHint {
                                page_id: node.child_at(child_index - 1),
                                index: child_index,
                                is_right: false,
                            }
                        }
                    } else {
                        SiblingHint {
                            page_id: node.child_at(child_index + 1),
                            index: child_index,
                            is_right: true,
                        }
                    }),
                };

                (safe, rewrite_low_key, child_id, hint)
            };

            // keep slot 0's key equal to the subtree minimum on the way down
            if rewrite_low_key {
                InternalMut::<K>::new(guard.data_mut()).set_key_at(0, key);
            }

            ctx.write_set.push_back(guard);
            if let Some(hint) = hint {
                ctx.hints.push(hint);
            }

            if safe {
                ctx.header = None;
                while ctx.write_set.len() > 1 {
                    ctx.write_set.pop_front();
                }
            }

            page_id = child_id;
        }

        Ok(ctx)
    }

    /// Splits the leaf at the back of the write set if it filled up, then
    /// bubbles split keys up the retained (unsafe) chain, growing the tree
    /// by one level when the split passes the old root.
    fn propagate_split(&self, ctx: &mut WriteContext) -> Result<()> {
        let mut split_key: K;
        let mut split_page_id: PageId;
        let mut last_page_id: PageId;
        let mut last_key: K;

        {
            let guard = ctx.write_set.back_mut().expect("descent ends at a leaf");
            last_page_id = guard.page_id();

            {
                let leaf = LeafRef::<K>::new(guard.data());
                if leaf.size() < leaf.max_size() {
                    return Ok(());
                }
            }

            let new_page_id = self.new_leaf_page()?;
            {
                let mut new_guard = self.bpm.fetch_write(new_page_id)?;
                let mut leaf = LeafMut::<K>::new(guard.data_mut());
                let mut new_leaf = LeafMut::<K>::new(new_guard.data_mut());

                split_key = leaf.split(&mut new_leaf);
                new_leaf.set_next_page_id(leaf.next_page_id());
                leaf.set_next_page_id(new_page_id);
                last_key = leaf.key_at(0);
            }
            self.bpm.unpin_page(new_page_id, true);
            split_page_id = new_page_id;

            debug!(
                left = last_page_id.as_u32(),
                right = split_page_id.as_u32(),
                "split leaf"
            );
        }
        ctx.write_set.pop_back();

        while !ctx.write_set.is_empty() {
            {
                let guard = ctx.write_set.back_mut().expect("checked non-empty");
                last_page_id = guard.page_id();

                let mut node = InternalMut::<K>::new(guard.data_mut());
                node.insert(&split_key, split_page_id);
                last_key = node.key_at(0);

                if node.size() < node.max_size() {
                    return Ok(());
                }

                let new_page_id = self.new_internal_page()?;
                {
                    let mut new_guard = self.bpm.fetch_write(new_page_id)?;
                    let mut new_node = InternalMut::<K>::new(new_guard.data_mut());
                    split_key = node.split(&mut new_node);
                }
                self.bpm.unpin_page(new_page_id, true);
                split_page_id = new_page_id;

                debug!(
                    left = last_page_id.as_u32(),
                    right = split_page_id.as_u32(),
                    "split internal node"
                );
            }
            ctx.write_set.pop_back();
        }

        // the split passed the old root: seed a new one with both halves
        let root_id = self.new_internal_page()?;
        {
            let mut root_guard = self.bpm.fetch_write(root_id)?;
            let mut root = InternalMut::<K>::new(root_guard.data_mut());
            root.insert(&last_key, last_page_id);
            root.insert(&split_key, split_page_id);
        }
        self.bpm.unpin_page(root_id, true);

        let header_guard = ctx
            .header
            .as_mut()
            .expect("root split happens under the header guard");
        HeaderMut::new(header_guard.data_mut()).set_root_page_id(root_id);
        debug!(root = root_id.as_u32(), "tree grew a level");
        Ok(())
    }

    /// Rebalances upward after a leaf deletion. Parent updates travel as
    /// (delete index, insert (key, page)) records; the header guard is still
    /// held whenever the propagation reaches the root.
    fn rebalance_after_remove(
        &self,
        ctx: &mut WriteContext,
        orphans: &mut Vec<PageId>,
    ) -> Result<()> {
        let mut inserts: Vec<(K, PageId)> = Vec::new();
        let mut deletes: Vec<usize> = Vec::new();

        if !self.rebalance_leaf(ctx, &mut inserts, &mut deletes, orphans)? {
            return Ok(());
        }

        while !ctx.write_set.is_empty() {
            let balanced = {
                let guard = ctx.write_set.back_mut().expect("checked non-empty");
                let mut node = InternalMut::<K>::new(guard.data_mut());
                for &index in &deletes {
                    node.remove_at(index);
                }
                for &(key, page_id) in &inserts {
                    node.insert(&key, page_id);
                }
                node.size() >= node.min_size()
            };
            if balanced {
                return Ok(());
            }
            self.rebalance_internal(ctx, &mut inserts, &mut deletes, orphans)?;
        }

        let header_guard = ctx
            .header
            .as_mut()
            .expect("underflow reaching the root holds the header guard");
        let mut header = HeaderMut::new(header_guard.data_mut());
        if let Some(&(_, new_root)) = inserts.first() {
            header.set_root_page_id(new_root);
            debug!(root = new_root.as_u32(), "root collapsed");
        } else if !deletes.is_empty() {
            header.set_root_page_id(INVALID_PAGE_ID);
            debug!("tree is now empty");
        }
        Ok(())
    }

    /// Handles underflow at the leaf level. Returns Ok(false) when the leaf
    /// is still at least half full and nothing needs to propagate.
    fn rebalance_leaf(
        &self,
        ctx: &mut WriteContext,
        inserts: &mut Vec<(K, PageId)>,
        deletes: &mut Vec<usize>,
        orphans: &mut Vec<PageId>,
    ) -> Result<bool> {
        let hint = *ctx.hints.last().expect("one hint per descended level");

        {
            let guard = ctx.write_set.back_mut().expect("descent ends at a leaf");
            let leaf_page_id = guard.page_id();

            {
                let leaf = LeafRef::<K>::new(guard.data());
                if leaf.size() >= leaf.min_size() {
                    return Ok(false);
                }
            }

            if hint.page_id != INVALID_PAGE_ID {
                let mut sibling_guard = self.bpm.fetch_write(hint.page_id)?;

                let (l_index, r_index, l_page, r_page, outcome) = {
                    let mut this = LeafMut::<K>::new(guard.data_mut());
                    let mut sibling = LeafMut::<K>::new(sibling_guard.data_mut());
                    if hint.is_right {
                        let outcome = this.rebalance(&mut sibling);
                        (hint.index, hint.index + 1, leaf_page_id, hint.page_id, outcome)
                    } else {
                        let outcome = sibling.rebalance(&mut this);
                        (hint.index - 1, hint.index, hint.page_id, leaf_page_id, outcome)
                    }
                };

                // the right index must be deleted first to stay valid
                deletes.push(r_index);
                deletes.push(l_index);
                match outcome {
                    Rebalance::Borrowed { left_key, right_key } => {
                        inserts.push((left_key, l_page));
                        inserts.push((right_key, r_page));
                    }
                    Rebalance::Merged { left_key } => {
                        inserts.push((left_key, l_page));
                        orphans.push(r_page);
                        debug!(
                            left = l_page.as_u32(),
                            right = r_page.as_u32(),
                            "merged leaves"
                        );
                    }
                }
            } else {
                // no sibling: this leaf is the root
                deletes.push(0);
                let leaf = LeafRef::<K>::new(guard.data());
                inserts.clear();
                if leaf.size() == 0 {
                    orphans.push(leaf_page_id);
                } else {
                    inserts.push((leaf.key_at(0), leaf_page_id));
                }
            }
        }

        ctx.write_set.pop_back();
        ctx.hints.pop();
        Ok(true)
    }

    /// Handles underflow at an internal level after parent records were
    /// applied. Mirrors the leaf case, plus the root endgame: a root left
    /// with a single child is collapsed away.
    fn rebalance_internal(
        &self,
        ctx: &mut WriteContext,
        inserts: &mut Vec<(K, PageId)>,
        deletes: &mut Vec<usize>,
        orphans: &mut Vec<PageId>,
    ) -> Result<()> {
        let hint = *ctx.hints.last().expect("one hint per descended level");
        let is_root = ctx.write_set.len() == 1;

        {
            let guard = ctx.write_set.back_mut().expect("checked non-empty");
            let node_page_id = guard.page_id();

            if hint.page_id != INVALID_PAGE_ID {
                deletes.clear();
                inserts.clear();
                let mut sibling_guard = self.bpm.fetch_write(hint.page_id)?;

                let (l_index, r_index, l_page, r_page, outcome) = {
                    let mut this = InternalMut::<K>::new(guard.data_mut());
                    let mut sibling = InternalMut::<K>::new(sibling_guard.data_mut());
                    if hint.is_right {
                        let outcome = this.rebalance(&mut sibling);
                        (hint.index, hint.index + 1, node_page_id, hint.page_id, outcome)
                    } else {
                        let outcome = sibling.rebalance(&mut this);
                        (hint.index - 1, hint.index, hint.page_id, node_page_id, outcome)
                    }
                };

                deletes.push(r_index);
                deletes.push(l_index);
                match outcome {
                    Rebalance::Borrowed { left_key, right_key } => {
                        inserts.push((left_key, l_page));
                        inserts.push((right_key, r_page));
                    }
                    Rebalance::Merged { left_key } => {
                        inserts.push((left_key, l_page));
                        orphans.push(r_page);
                        debug!(
                            left = l_page.as_u32(),
                            right = r_page.as_u32(),
                            "merged internal nodes"
                        );
                    }
                }
            } else {
                // no sibling: the root, or a node on a single-child spine.
                // Slot 0 of the level above references this node.
                deletes.clear();
                deletes.push(0);
                let node = InternalRef::<K>::new(guard.data());
                if node.size() == 0 {
                    inserts.clear();
                    orphans.push(node_page_id);
                } else if node.size() == 1 && is_root {
                    // the pending insert records point at the root's single
                    // child; the header promotes it to be the new root
                    orphans.push(node_page_id);
                } else {
                    // keep the node (spine nodes may sit below min size)
                    // and refresh the slot referencing it one level up
                    inserts.clear();
                    inserts.push((node.key_at(0), node_page_id));
                }
            }
        }

        ctx.write_set.pop_back();
        ctx.hints.pop();
        Ok(())
    }

    fn new_leaf_page(&self) -> Result<PageId> {
        let page_id = self.bpm.new_page()?;
        let mut guard = self.bpm.fetch_write(page_id)?;
        LeafMut::<K>::new(guard.data_mut()).init(self.leaf_max_size);
        Ok(page_id)
    }

    fn new_internal_page(&self) -> Result<PageId> {
        let page_id = self.bpm.new_page()?;
        let mut guard = self.bpm.fetch_write(page_id)?;
        InternalMut::<K>::new(guard.data_mut()).init(self.internal_max_size);
        Ok(page_id)
    }

    fn kind_of(data: &[u8]) -> Result<NodeKind> {
        node_kind(data)
            .ok_or_else(|| BurrowError::IndexCorrupted("unknown node tag".to_string()))
    }
}
