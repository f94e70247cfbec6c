use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::LeafRef;
use super::key::IndexKey;

/// Forward iterator over the leaf chain in key order.
///
/// The iterator holds a position (leaf page id + slot index) and a cached
/// copy of the current entry. Each advance re-fetches the leaf under a
/// short-lived read guard; no latch is held between steps. The end iterator
/// is the position (INVALID_PAGE_ID, 0).
pub struct TreeIterator<K: IndexKey> {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    index: usize,
    current: Option<(K, RecordId)>,
}

impl<K: IndexKey> TreeIterator<K> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, index: usize) -> Result<Self> {
        if page_id == INVALID_PAGE_ID {
            return Ok(Self::end(bpm));
        }

        let current = {
            let guard = bpm.fetch_read(page_id)?;
            let leaf = LeafRef::<K>::new(guard.data());
            (index < leaf.size() as usize).then(|| leaf.entry_at(index))
        };
        if current.is_none() {
            return Ok(Self::end(bpm));
        }

        Ok(Self {
            bpm,
            page_id,
            index,
            current,
        })
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            page_id: INVALID_PAGE_ID,
            index: 0,
            current: None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.page_id == INVALID_PAGE_ID
    }

    /// The entry under the cursor; None at the end position.
    pub fn entry(&self) -> Option<(K, RecordId)> {
        self.current
    }

    /// Steps to the next entry, following the leaf chain across page
    /// boundaries.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }

        let mut next_page_id = {
            let guard = self.bpm.fetch_read(self.page_id)?;
            let leaf = LeafRef::<K>::new(guard.data());

            if self.index + 1 < leaf.size() as usize {
                self.index += 1;
                self.current = Some(leaf.entry_at(self.index));
                return Ok(());
            }
            leaf.next_page_id()
        };

        // a chain link may still point at a leaf drained by rebalancing
        loop {
            self.page_id = next_page_id;
            self.index = 0;
            if next_page_id == INVALID_PAGE_ID {
                self.current = None;
                return Ok(());
            }

            let guard = self.bpm.fetch_read(next_page_id)?;
            let leaf = LeafRef::<K>::new(guard.data());
            if leaf.size() > 0 {
                self.current = Some(leaf.entry_at(0));
                return Ok(());
            }
            next_page_id = leaf.next_page_id();
        }
    }
}

impl<K: IndexKey> PartialEq for TreeIterator<K> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl<K: IndexKey> Eq for TreeIterator<K> {}

impl<K: IndexKey> Iterator for TreeIterator<K> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.current?;
        match self.advance() {
            Ok(()) => Some(Ok(entry)),
            Err(e) => {
                self.page_id = INVALID_PAGE_ID;
                self.index = 0;
                self.current = None;
                Some(Err(e))
            }
        }
    }
}
