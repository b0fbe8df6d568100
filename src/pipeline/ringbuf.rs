//! Bounded ring of captured raw frames

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use tracing::debug;

use crate::capture::RawFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureResult {
    /// Copied into `slot`.
    Stored { slot: usize },
    /// At capacity; nothing was copied.
    Full,
}

/// Fills up to capacity, then rejects further captures. Saved frames are
/// never overwritten during a session.
pub struct FrameStore {
    ring: HeapRb<RawFrame>,
    next_sequence: u64,
    stats: Stats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub frames_saved: usize,
    pub captures_rejected: usize,
}

impl FrameStore {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity),
            next_sequence: 0,
            stats: Stats::default(),
        }
    }

    /// Copy `inbound` verbatim into the next free slot.
    ///
    /// The caller must hold the frame buffers paused.
    pub fn capture(&mut self, inbound: &[u16]) -> CaptureResult {
        if self.ring.is_full() {
            self.stats.captures_rejected += 1;
            return CaptureResult::Full;
        }

        let slot = self.next_slot();
        let frame = RawFrame::new(self.next_sequence, inbound);
        if self.ring.try_push(frame).is_err() {
            self.stats.captures_rejected += 1;
            return CaptureResult::Full;
        }

        self.next_sequence += 1;
        self.stats.frames_saved += 1;
        debug!(slot, samples = inbound.len(), "Raw frame stored");
        CaptureResult::Stored { slot }
    }

    /// Saved frame `index`, oldest first.
    pub fn load(&self, index: usize) -> Option<&RawFrame> {
        self.ring.iter().nth(index)
    }

    pub fn latest(&self) -> Option<&RawFrame> {
        self.len().checked_sub(1).and_then(|i| self.load(i))
    }

    /// Number of saved frames.
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Slot the next capture will land in.
    pub fn next_slot(&self) -> usize {
        self.len()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_RAW_IMAGES: usize = 32;

    #[test]
    fn fills_to_capacity_then_rejects() {
        let mut store = FrameStore::new(MAX_RAW_IMAGES);
        for n in 0..MAX_RAW_IMAGES {
            let frame = [n as u16; 6];
            assert_eq!(store.capture(&frame), CaptureResult::Stored { slot: n });
        }
        assert_eq!(store.len(), MAX_RAW_IMAGES);
        assert!(store.is_full());

        assert_eq!(store.capture(&[999; 6]), CaptureResult::Full);
        assert_eq!(store.len(), MAX_RAW_IMAGES);
        assert_eq!(
            store.stats(),
            Stats {
                frames_saved: MAX_RAW_IMAGES,
                captures_rejected: 1
            }
        );
        // nothing was overwritten
        assert_eq!(store.load(0).unwrap().data[0], 0);
        assert_eq!(store.latest().unwrap().data[0], 31);
    }

    #[test]
    fn load_is_bounded_by_saved_count() {
        let mut store = FrameStore::new(4);
        assert!(store.load(0).is_none());
        assert!(store.latest().is_none());

        store.capture(&[1, 2, 3]);
        store.capture(&[4, 5, 6]);
        assert_eq!(store.next_slot(), 2);
        assert_eq!(&*store.load(1).unwrap().data, &[4, 5, 6]);
        assert_eq!(store.load(1).unwrap().sequence, 1);
        assert!(store.load(2).is_none());
        assert_eq!(store.capacity(), 4);
    }

    #[test]
    fn capture_copies_upper_bits_verbatim() {
        let mut store = FrameStore::new(1);
        store.capture(&[0xFFFF, 0x1234]);
        assert_eq!(&*store.load(0).unwrap().data, &[0xFFFF, 0x1234]);
    }
}
