use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use super::segment::{Segment, SEGMENT_SIZE};

pub const DEFAULT_MAX_IDLE_SEGMENTS: usize = 4096;

pub(super) struct PoolShared {
    free: Mutex<Vec<Box<[u8]>>>,
    max_idle: usize,
    outstanding: AtomicUsize,
    allocated: AtomicUsize,
}

impl PoolShared {
    pub(super) fn recycle(&self, data: Box<[u8]>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        if data.len() != SEGMENT_SIZE {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(data);
        }
    }
}

impl std::fmt::Debug for PoolShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolShared")
            .field("idle", &self.free.lock().len())
            .field("max_idle", &self.max_idle)
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .finish()
    }
}

/// Shared free list of segment storage.
///
/// This is the only piece of state shared between connection tasks. Cloning
/// the pool clones a handle; every clone hands out and takes back storage
/// from the same free list. A process normally creates one pool at start and
/// calls `drain` at shutdown, while tests create one per case.
#[derive(Clone, Debug)]
pub struct SegmentPool {
    shared: Arc<PoolShared>,
}

impl SegmentPool {
    /// Creates a pool that keeps at most `max_idle` released segments around
    /// for reuse. Storage released beyond that is freed.
    pub fn new(max_idle: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(std::cmp::min(max_idle, 256))),
                max_idle,
                outstanding: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns an empty segment, reusing released storage when available.
    pub fn acquire(&self) -> Segment {
        let reused = self.shared.free.lock().pop();
        let data = match reused {
            Some(data) => data,
            None => {
                self.shared.allocated.fetch_add(1, Ordering::Relaxed);
                vec![0u8; SEGMENT_SIZE].into_boxed_slice()
            }
        };
        self.shared.outstanding.fetch_add(1, Ordering::Relaxed);
        Segment::new(data, self.shared.clone())
    }

    /// Number of released segments waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared.free.lock().len()
    }

    /// Number of segments currently held by chains or callers.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Relaxed)
    }

    /// Number of times fresh storage had to be allocated.
    pub fn allocated(&self) -> usize {
        self.shared.allocated.load(Ordering::Relaxed)
    }

    /// Frees all idle storage. Returns how many segments were freed.
    pub fn drain(&self) -> usize {
        let drained = std::mem::take(&mut *self.shared.free.lock());
        debug!(
            "segment pool drained {} idle segments ({} outstanding)",
            drained.len(),
            self.outstanding()
        );
        drained.len()
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_SEGMENTS)
    }
}
