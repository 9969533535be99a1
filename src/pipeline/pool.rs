//! Fixed-capacity buffer slot arena for one stream

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam::utils::CachePadded;
use tracing::{debug, trace};

use crate::capture::device::StreamKind;
use crate::capture::frame::{FrameBuffer, PixelFormat, Resolution};
use crate::error::{CameraError, Result};

/// Ownership tag of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Owned by the pool, eligible for `acquire`
    Free,
    /// Handed to the producer, not yet delivered
    Filling,
    /// Owned by the consumer until released
    InFlight,
}

/// Round-robin slot arena. Indices are stable for the pool's lifetime.
pub struct BufferPool {
    stream: StreamKind,
    inner: Mutex<Slots>,
    stats: CachePadded<Stats>,
}

struct Slots {
    states: Vec<SlotState>,
    cursor: usize,
}

#[derive(Default)]
struct Stats {
    acquired: AtomicUsize,
    delivered: AtomicUsize,
    released: AtomicUsize,
    dropped: AtomicUsize,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: usize,
    pub delivered: usize,
    pub released: usize,
    pub dropped: usize,
}

impl BufferPool {
    pub fn new(stream: StreamKind, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CameraError::InvalidParameter);
        }
        let mut states = Vec::new();
        states.try_reserve_exact(capacity)?;
        states.resize(capacity, SlotState::Free);
        Ok(Self {
            stream,
            inner: Mutex::new(Slots { states, cursor: 0 }),
            stats: CachePadded::new(Stats::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.lock().states.len()
    }

    /// Producer: take the next free slot after the last one handed out.
    ///
    /// Returns `None` when every slot is filling or in flight; the frame is
    /// dropped and counted.
    pub fn acquire(&self, format: PixelFormat, resolution: Resolution) -> Option<FrameBuffer> {
        let mut slots = self.lock();
        let len = slots.states.len();
        let start = slots.cursor;
        for offset in 0..len {
            let index = (start + offset) % len;
            if slots.states[index] == SlotState::Free {
                slots.states[index] = SlotState::Filling;
                slots.cursor = (index + 1) % len;
                self.stats.acquired.fetch_add(1, Ordering::Relaxed);
                trace!(stream = self.stream.as_str(), index, "slot acquired");
                return Some(FrameBuffer::new(index, format, resolution));
            }
        }
        drop(slots);

        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camhal_frames_dropped", "stream" => self.stream.as_str()).increment(1);
        debug!(stream = self.stream.as_str(), "no free slot, dropping frame");
        None
    }

    /// Producer: hand a filled slot to the consumer side.
    pub fn mark_in_flight(&self, index: usize) -> Result<()> {
        let mut slots = self.lock();
        match slots.states.get(index) {
            Some(SlotState::Filling) => {
                slots.states[index] = SlotState::InFlight;
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Some(_) => Err(CameraError::InvalidState),
            None => Err(CameraError::InvalidParameter),
        }
    }

    /// Producer: give back a slot that will not be delivered.
    pub fn discard(&self, index: usize) -> Result<()> {
        let mut slots = self.lock();
        match slots.states.get(index) {
            Some(SlotState::Filling) => {
                slots.states[index] = SlotState::Free;
                Ok(())
            }
            Some(_) => Err(CameraError::InvalidState),
            None => Err(CameraError::InvalidParameter),
        }
    }

    /// Consumer: return an in-flight slot. Releasing a free slot is a no-op.
    pub fn release(&self, index: usize) -> Result<()> {
        let mut slots = self.lock();
        match slots.states.get(index) {
            None => Err(CameraError::InvalidParameter),
            Some(SlotState::Free) => {
                debug!(stream = self.stream.as_str(), index, "release of free slot ignored");
                Ok(())
            }
            // still owned by the producer
            Some(SlotState::Filling) => Err(CameraError::InvalidParameter),
            Some(SlotState::InFlight) => {
                slots.states[index] = SlotState::Free;
                self.stats.released.fetch_add(1, Ordering::Relaxed);
                trace!(stream = self.stream.as_str(), index, "slot released");
                Ok(())
            }
        }
    }

    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.lock().states.get(index).copied()
    }

    pub fn in_flight(&self) -> usize {
        self.lock()
            .states
            .iter()
            .filter(|s| **s == SlotState::InFlight)
            .count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.stats.acquired.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            released: self.stats.released.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        // slot tags stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
