use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{BurrowError, FrameId, Result, Timestamp};

/// Access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// Up to the last k access timestamps, oldest first
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be evicted
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Oldest recorded timestamp. With the history bounded at k entries this
    /// is the kth most recent access once the frame has a full history.
    fn oldest_timestamp(&self) -> Timestamp {
        *self.history.front().expect("history is never empty")
    }
}

/// All replacer state lives behind one mutex.
struct LruKState {
    nodes: HashMap<FrameId, LruKNode>,
    current_timestamp: Timestamp,
    /// Number of evictable frames
    curr_size: usize,
}

/// LRU-K replacement policy.
///
/// The victim is the frame whose backward k-distance (time since its kth
/// most recent access) is largest. Frames with fewer than k recorded
/// accesses count as infinitely distant and are preferred; ties inside
/// either group fall back to the earliest oldest-access timestamp.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<LruKState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(LruKState {
                nodes: HashMap::new(),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Chooses and forgets the frame to evict.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.curr_size == 0 {
            return None;
        }

        let mut victim: Option<(FrameId, bool, Timestamp)> = None;
        for (&frame_id, node) in state.nodes.iter() {
            if !node.is_evictable {
                continue;
            }

            let full_history = node.history.len() >= self.k;
            let oldest = node.oldest_timestamp();

            let replace = match victim {
                None => true,
                Some((_, victim_full, victim_oldest)) => {
                    if full_history != victim_full {
                        // a frame still short of k accesses beats any full one
                        !full_history
                    } else {
                        oldest < victim_oldest
                    }
                }
            };
            if replace {
                victim = Some((frame_id, full_history, oldest));
            }
        }

        let (frame_id, _, _) = victim?;
        state.nodes.remove(&frame_id);
        state.curr_size -= 1;
        Some(frame_id)
    }

    /// Records an access to the given frame at the next timestamp, creating
    /// the (non-evictable) frame entry if it was unknown.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;

        state
            .nodes
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(timestamp, self.k);
    }

    /// Toggles whether a frame may be evicted. Unknown frames and
    /// already-matching flags are no-ops.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        let mut state = self.state.lock();

        let delta = match state.nodes.get_mut(&frame_id) {
            Some(node) if node.is_evictable != is_evictable => {
                node.is_evictable = is_evictable;
                if is_evictable {
                    1
                } else {
                    -1
                }
            }
            _ => 0,
        };
        state.curr_size = (state.curr_size as isize + delta) as usize;
    }

    /// Forcibly forgets a frame. Removing a known non-evictable frame is a
    /// caller bug and reported as an error; unknown frames are accepted.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut state = self.state.lock();

        let evictable = match state.nodes.get(&frame_id) {
            None => return Ok(()),
            Some(node) => node.is_evictable,
        };
        if !evictable {
            return Err(BurrowError::FrameNotEvictable(frame_id));
        }

        state.nodes.remove(&frame_id);
        state.curr_size -= 1;
        Ok(())
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
