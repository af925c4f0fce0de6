use std::io::Read;
use std::sync::Arc;

use super::segment_pool::PoolShared;

/// Capacity of every segment handed out by a `SegmentPool`.
pub const SEGMENT_SIZE: usize = 8192;

/// A fixed-capacity byte buffer with a `start..end` content window.
///
/// Segments are only created by `SegmentPool::acquire`. Dropping a segment
/// returns its storage to the pool it came from, so releasing a segment and
/// dropping it are the same thing.
///
/// Invariant: `0 <= start <= end <= capacity`.
pub struct Segment {
    data: Box<[u8]>,
    start: usize,
    end: usize,
    pool: Arc<PoolShared>,
}

impl Segment {
    pub(super) fn new(data: Box<[u8]>, pool: Arc<PoolShared>) -> Self {
        Self {
            data,
            start: 0,
            end: 0,
            pool,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when no more bytes can be written at the end.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.end == self.data.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Free space after the content window.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.data.len() - self.end
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.start..self.end]
    }

    /// The writable space after the content window. Call `advance_write`
    /// after filling it.
    #[inline]
    pub fn write_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    #[inline]
    pub fn advance_write(&mut self, n: usize) {
        debug_assert!(
            self.end + n <= self.data.len(),
            "Segment advance_write overflow: end={}, n={}, capacity={}",
            self.end,
            n,
            self.data.len()
        );
        self.end += n;
    }

    /// Grows the content window by `n` bytes and returns the new bytes, for
    /// callers that serialize fixed-size headers in place.
    ///
    /// # Panics
    /// Panics if there is less than `n` bytes of free space.
    pub fn extend(&mut self, n: usize) -> &mut [u8] {
        assert!(
            n <= self.remaining_capacity(),
            "Segment extend overflow: need {} bytes, have {}",
            n,
            self.remaining_capacity()
        );
        let end = self.end;
        self.end += n;
        &mut self.data[end..end + n]
    }

    /// Drops `n` bytes from the front of the content window.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        debug_assert!(
            n <= self.len(),
            "Segment consume underflow: n={}, len={}",
            n,
            self.len()
        );
        self.start += n;
        if self.start >= self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Keeps only the first `n` bytes of the content window.
    #[inline]
    pub fn truncate(&mut self, n: usize) {
        debug_assert!(
            n <= self.len(),
            "Segment truncate overflow: n={}, len={}",
            n,
            self.len()
        );
        self.end = self.start + n;
    }

    /// Copies as much of `src` as fits into the free space, returning the
    /// number of bytes written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = std::cmp::min(src.len(), self.remaining_capacity());
        self.data[self.end..self.end + n].copy_from_slice(&src[..n]);
        self.end += n;
        n
    }

    /// Moves up to `dst.len()` bytes out of the front of the window.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = std::cmp::min(dst.len(), self.len());
        dst[..n].copy_from_slice(&self.data[self.start..self.start + n]);
        self.consume(n);
        n
    }

    /// Reads from `reader` until the segment is full or the reader reports
    /// end of input. Returns `false` on end of input.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> std::io::Result<bool> {
        while !self.is_full() {
            match reader.read(self.write_slice()) {
                Ok(0) => return Ok(false),
                Ok(n) => self.advance_write(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        self.pool.recycle(std::mem::take(&mut self.data));
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("capacity", &self.data.len())
            .finish()
    }
}
