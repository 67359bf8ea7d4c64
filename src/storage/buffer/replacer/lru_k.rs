use std::collections::{HashMap, VecDeque};
use parking_lot::Mutex;

use crate::common::types::{FrameId, Timestamp};

/// Per-frame access bookkeeping: the most recent accesses (newest first)
/// and whether the frame may currently be evicted.
struct LruKNode {
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Timestamp of the k-th most recent access, or the oldest access when
    /// fewer than k are recorded (the "infinite distance" class).
    fn kth_backward(&self, k: usize) -> Timestamp {
        if self.history.len() >= k {
            self.history[k - 1]
        } else {
            *self.history.back().unwrap_or(&0)
        }
    }
}

struct ReplacerState {
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: Timestamp,
    curr_size: usize,
}

/// LRU-K page replacement policy.
///
/// The victim is the evictable frame with the largest backward k-distance:
/// frames with fewer than k recorded accesses have infinite distance and
/// always win over frames with a full history; ties among them fall back to
/// plain LRU on the oldest access.
pub struct LruKReplacer {
    state: Mutex<ReplacerState>,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K needs k >= 1");
        Self {
            state: Mutex::new(ReplacerState {
                node_store: HashMap::with_capacity(num_frames),
                current_timestamp: 0,
                curr_size: 0,
            }),
            k,
        }
    }

    /// Record an access to the given frame at the current timestamp
    pub fn record_access(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let now = state.current_timestamp;

        let node = state.node_store.entry(frame_id).or_insert_with(LruKNode::new);
        node.history.push_front(now);
        // Only the k most recent accesses matter
        node.history.truncate(self.k);
    }

    /// Mark a frame evictable or pinned-down
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let node = state.node_store.entry(frame_id).or_insert_with(LruKNode::new);
        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
    }

    /// Forget a frame entirely. Untracked frames are ignored.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(node) = state.node_store.remove(&frame_id) {
            assert!(
                node.is_evictable,
                "removing a non-evictable frame from the replacer"
            );
            state.curr_size -= 1;
        }
    }

    /// Select, untrack and return the victim frame, or `None` when no frame
    /// is evictable. Selection and removal happen under one lock acquisition.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        let mut victim: Option<FrameId> = None;
        let mut victim_infinite = false;
        let mut victim_kth: Timestamp = 0;

        for (&frame_id, node) in &state.node_store {
            if !node.is_evictable {
                continue;
            }
            let infinite = node.history.len() < self.k;
            let kth = node.kth_backward(self.k);

            let better = match victim {
                None => true,
                // An infinite-distance frame beats any finite one; within a
                // class the smaller (older) timestamp wins.
                Some(_) => match (infinite, victim_infinite) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => kth < victim_kth,
                },
            };
            if better {
                victim = Some(frame_id);
                victim_infinite = infinite;
                victim_kth = kth;
            }
        }

        if let Some(frame_id) = victim {
            state.node_store.remove(&frame_id);
            state.curr_size -= 1;
        }
        victim
    }

    /// Number of evictable frames currently tracked
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }
}
