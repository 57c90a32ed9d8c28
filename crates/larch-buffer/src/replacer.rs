//! Clock page replacement for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock replacement algorithm.
///
/// Frames earn a reference bit on access; the clock hand clears bits until
/// it finds a candidate whose bit is unset. Whether a candidate is actually
/// evictable (pin count zero) is decided by the pool through a predicate,
/// so the replacer never races against pin bookkeeping it does not own.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Candidate set and clock hand, guarded together.
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    /// Frames that may be considered for eviction.
    candidates: HashSet<FrameId>,
    /// Current clock hand position.
    hand: usize,
}

impl ClockReplacer {
    /// Creates a new clock replacer for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: (0..num_frames).map(|_| AtomicBool::new(false)).collect(),
            inner: Mutex::new(ClockInner {
                candidates: HashSet::new(),
                hand: 0,
            }),
        }
    }

    /// Records an access to the frame, granting it a second chance.
    #[inline]
    pub fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    /// Adds a frame to the candidate set.
    pub fn insert(&self, frame_id: FrameId) {
        if (frame_id.0 as usize) < self.num_frames {
            self.inner.lock().candidates.insert(frame_id);
        }
    }

    /// Removes a frame from the candidate set and clears its reference bit.
    pub fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.inner.lock().candidates.remove(&frame_id);
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }

    /// Returns the number of candidate frames.
    pub fn len(&self) -> usize {
        self.inner.lock().candidates.len()
    }

    /// Returns true if there are no candidate frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selects a victim frame for eviction.
    ///
    /// `evictable` is consulted for each candidate under the clock hand;
    /// frames it rejects (still pinned) are skipped. Returns None when no
    /// candidate passes.
    pub fn evict<F>(&self, evictable: F) -> Option<FrameId>
    where
        F: Fn(FrameId) -> bool,
    {
        let mut inner = self.inner.lock();

        if inner.candidates.is_empty() {
            return None;
        }

        // Two full rotations: the first may only be clearing reference bits.
        for _ in 0..(2 * self.num_frames) {
            let hand = inner.hand;
            let frame_id = FrameId(hand as u32);
            inner.hand = (hand + 1) % self.num_frames;

            if inner.candidates.contains(&frame_id) && evictable(frame_id) {
                if self.reference_bits[hand].load(Ordering::Relaxed) {
                    self.reference_bits[hand].store(false, Ordering::Relaxed);
                } else {
                    inner.candidates.remove(&frame_id);
                    return Some(frame_id);
                }
            }
        }

        // Everything kept its reference bit alive; take any evictable candidate.
        let victim = inner
            .candidates
            .iter()
            .copied()
            .find(|&frame_id| evictable(frame_id));
        if let Some(frame_id) = victim {
            inner.candidates.remove(&frame_id);
        }
        victim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_replacer_new() {
        let replacer = ClockReplacer::new(10);
        assert!(replacer.is_empty());
    }

    #[test]
    fn test_clock_replacer_insert_remove() {
        let replacer = ClockReplacer::new(10);

        replacer.insert(FrameId(0));
        replacer.insert(FrameId(1));
        replacer.insert(FrameId(2));
        assert_eq!(replacer.len(), 3);

        replacer.remove(FrameId(1));
        assert_eq!(replacer.len(), 2);
    }

    #[test]
    fn test_clock_replacer_evict_empty() {
        let replacer = ClockReplacer::new(10);
        assert!(replacer.evict(|_| true).is_none());
    }

    #[test]
    fn test_clock_replacer_evict_single() {
        let replacer = ClockReplacer::new(10);

        replacer.insert(FrameId(5));
        assert_eq!(replacer.evict(|_| true), Some(FrameId(5)));
        assert!(replacer.is_empty());
    }

    #[test]
    fn test_clock_replacer_second_chance() {
        let replacer = ClockReplacer::new(10);

        replacer.insert(FrameId(0));
        replacer.insert(FrameId(1));
        replacer.insert(FrameId(2));

        // Frames 0 and 1 were touched; frame 2 goes first.
        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        assert_eq!(replacer.evict(|_| true), Some(FrameId(2)));
    }

    #[test]
    fn test_clock_replacer_evict_all_referenced() {
        let replacer = ClockReplacer::new(3);

        for i in 0..3 {
            replacer.insert(FrameId(i));
            replacer.record_access(FrameId(i));
        }

        // Still evicts after the first rotation clears the bits.
        assert!(replacer.evict(|_| true).is_some());
        assert_eq!(replacer.len(), 2);
    }

    #[test]
    fn test_clock_replacer_respects_predicate() {
        let replacer = ClockReplacer::new(4);

        replacer.insert(FrameId(0));
        replacer.insert(FrameId(1));

        // Frame 0 stays pinned.
        let victim = replacer.evict(|frame_id| frame_id != FrameId(0));
        assert_eq!(victim, Some(FrameId(1)));

        // Only the pinned frame remains.
        assert!(replacer.evict(|frame_id| frame_id != FrameId(0)).is_none());
        assert_eq!(replacer.len(), 1);
    }

    #[test]
    fn test_clock_replacer_out_of_bounds() {
        let replacer = ClockReplacer::new(5);

        replacer.insert(FrameId(100));
        replacer.record_access(FrameId(100));
        replacer.remove(FrameId(100));

        assert!(replacer.is_empty());
    }

    #[test]
    fn test_clock_replacer_reinsert_after_evict() {
        let replacer = ClockReplacer::new(3);

        replacer.insert(FrameId(0));
        assert_eq!(replacer.evict(|_| true), Some(FrameId(0)));

        replacer.insert(FrameId(0));
        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.evict(|_| true), Some(FrameId(0)));
    }
}
