use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use thiserror::Error;

/// Identifies a frame in the buffer pool.
pub type FrameId = usize;

/// Errors returned by replacer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplacerError {
    /// The frame id lies outside the replacer's frame domain.
    #[error("frame id {frame_id} out of range for replacer of {capacity} frames")]
    FrameOutOfRange { frame_id: FrameId, capacity: usize },
    /// The frame is tracked but not evictable, so it cannot be removed.
    #[error("frame {0} is not evictable and cannot be removed")]
    FrameNotEvictable(FrameId),
}

/// Convenience alias for replacer results.
pub type ReplacerResult<T> = Result<T, ReplacerError>;

/// Eviction policy for buffer pool frames.
pub trait Replacer {
    /// Chooses a victim frame, untracking it. Returns `None` when no
    /// tracked frame is evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Records one access to a frame, tracking it on first sight.
    fn record_access(&self, frame_id: FrameId) -> ReplacerResult<()>;

    /// Toggles whether a frame may be chosen as a victim. Ignored for
    /// frames with no recorded access.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> ReplacerResult<()>;

    /// Forcibly untracks an evictable frame, regardless of its position
    /// in the eviction order. Ignored for untracked frames.
    fn remove(&self, frame_id: FrameId) -> ReplacerResult<()>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Ordered working set of frames, most recently inserted at the front.
/// Membership checks are O(1); removal scans the order once.
#[derive(Debug, Default)]
struct AccessQueue {
    order: VecDeque<FrameId>,
    members: HashSet<FrameId>,
}

impl AccessQueue {
    fn contains(&self, frame_id: FrameId) -> bool {
        self.members.contains(&frame_id)
    }

    fn push_front(&mut self, frame_id: FrameId) {
        if self.members.insert(frame_id) {
            self.order.push_front(frame_id);
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        if self.members.remove(&frame_id) {
            self.order.retain(|&entry| entry != frame_id);
        }
    }

    fn move_to_front(&mut self, frame_id: FrameId) {
        self.remove(frame_id);
        self.push_front(frame_id);
    }

    /// Iterates least recent first.
    fn iter_lru(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.order.iter().rev().copied()
    }
}

#[derive(Debug)]
struct FrameState {
    access_count: usize,
    evictable: bool,
}

#[derive(Debug, Default)]
struct LruKState {
    frames: HashMap<FrameId, FrameState>,
    history: AccessQueue,
    cache: AccessQueue,
    curr_size: usize,
}

impl LruKState {
    /// Drops every trace of a frame. Assumes the latch is held and the
    /// frame is tracked and evictable.
    fn untrack(&mut self, frame_id: FrameId) {
        self.history.remove(frame_id);
        self.cache.remove(frame_id);
        self.frames.remove(&frame_id);
        self.curr_size -= 1;
    }
}

/// LRU-K replacer over a bounded frame domain.
///
/// Frames with fewer than `k` recorded accesses live in a history list
/// ordered by first sighting; frames with at least `k` accesses live in a
/// cache list ordered by most recent access. Victims come from the
/// history list first, least recent first, so infrequently accessed
/// frames are reclaimed before frequently accessed ones.
///
/// Once promoted to the cache list, frames are kept in plain
/// most-recent-access order rather than by their K-th most recent access
/// timestamp.
pub struct LruKReplacer {
    replacer_size: usize,
    k: usize,
    state: Mutex<LruKState>,
}

impl LruKReplacer {
    /// Creates a replacer for frame ids in `[0, num_frames)` with access
    /// threshold `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "replacer k must be positive");
        Self {
            replacer_size: num_frames,
            k,
            state: Mutex::new(LruKState::default()),
        }
    }

    fn check_bounds(&self, frame_id: FrameId) -> ReplacerResult<()> {
        if frame_id >= self.replacer_size {
            return Err(ReplacerError::FrameOutOfRange {
                frame_id,
                capacity: self.replacer_size,
            });
        }
        Ok(())
    }
}

impl Replacer for LruKReplacer {
    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.curr_size == 0 {
            return None;
        }

        let victim = state
            .history
            .iter_lru()
            .find(|frame_id| state.frames[frame_id].evictable)
            .or_else(|| {
                state
                    .cache
                    .iter_lru()
                    .find(|frame_id| state.frames[frame_id].evictable)
            });

        if let Some(frame_id) = victim {
            state.untrack(frame_id);
        }
        victim
    }

    fn record_access(&self, frame_id: FrameId) -> ReplacerResult<()> {
        self.check_bounds(frame_id)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame = state.frames.entry(frame_id).or_insert(FrameState {
            access_count: 0,
            evictable: false,
        });
        frame.access_count += 1;
        let count = frame.access_count;

        if count < self.k {
            // History order is by first sighting; repeated accesses under
            // the threshold do not reorder the list.
            if !state.history.contains(frame_id) {
                state.history.push_front(frame_id);
            }
        } else if count == self.k {
            state.history.remove(frame_id);
            state.cache.push_front(frame_id);
        } else {
            state.cache.move_to_front(frame_id);
        }
        Ok(())
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> ReplacerResult<()> {
        self.check_bounds(frame_id)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(frame) = state.frames.get_mut(&frame_id) else {
            return Ok(());
        };
        if frame.evictable != evictable {
            frame.evictable = evictable;
            if evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
        Ok(())
    }

    fn remove(&self, frame_id: FrameId) -> ReplacerResult<()> {
        self.check_bounds(frame_id)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(frame) = state.frames.get(&frame_id) else {
            return Ok(());
        };
        if !frame.evictable {
            return Err(ReplacerError::FrameNotEvictable(frame_id));
        }
        state.untrack(frame_id);
        Ok(())
    }

    fn size(&self) -> usize {
        self.state.lock().curr_size
    }
}
