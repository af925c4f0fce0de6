//! Chains of segments representing one logical byte stream.
//!
//! A `MultiBuffer` never copies bytes to grow, merge or split, except for the
//! single bounded copy needed when a split point falls inside a segment.
//! Empty segments are never kept: anything drained to zero length is dropped
//! straight back to its pool.

use std::collections::VecDeque;
use std::io::Read;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::segment::Segment;
use super::segment_pool::SegmentPool;

#[derive(Default)]
pub struct MultiBuffer {
    segments: VecDeque<Segment>,
}

/// Error from reading a source into a chain, carrying whatever was read
/// before the failure.
#[derive(Debug, thiserror::Error)]
#[error("read failed after {} bytes: {}", .partial.len(), .error)]
pub struct PartialRead {
    pub partial: MultiBuffer,
    #[source]
    pub error: std::io::Error,
}

impl MultiBuffer {
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
        }
    }

    pub fn from_bytes(pool: &SegmentPool, data: &[u8]) -> Self {
        let mut mb = Self::new();
        mb.append_bytes(pool, data);
        mb
    }

    /// Total number of content bytes across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub(crate) fn segments_mut(&mut self) -> impl Iterator<Item = &mut Segment> {
        self.segments.iter_mut()
    }

    /// Appends a segment at the end. Empty segments are released instead.
    pub fn push_segment(&mut self, segment: Segment) {
        if !segment.is_empty() {
            self.segments.push_back(segment);
        }
    }

    /// Writes `data` into the free space of the last segment, then into as
    /// many new segments as needed.
    pub fn append_bytes(&mut self, pool: &SegmentPool, mut data: &[u8]) {
        if let Some(tail) = self.segments.back_mut() {
            if !tail.is_full() {
                let n = tail.write(data);
                data = &data[n..];
            }
        }

        while !data.is_empty() {
            let mut segment = pool.acquire();
            let n = segment.write(data);
            data = &data[n..];
            self.segments.push_back(segment);
        }
    }

    /// Moves every segment of `src` to the end of `self`. `src` is left empty.
    pub fn merge(&mut self, src: &mut MultiBuffer) {
        self.segments.append(&mut src.segments);
    }

    /// Removes exactly `min(n, self.len())` bytes from the front and returns
    /// them as a new chain.
    ///
    /// When `n` falls inside a segment, the smaller side of that segment is
    /// copied into a freshly acquired one, so at most half a segment is ever
    /// copied.
    pub fn split_by_length(&mut self, pool: &SegmentPool, n: usize) -> MultiBuffer {
        let mut taken = MultiBuffer::new();
        let mut needed = n;

        while needed > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            let front_len = front.len();

            if front_len <= needed {
                needed -= front_len;
                if let Some(segment) = self.segments.pop_front() {
                    taken.segments.push_back(segment);
                }
                continue;
            }

            if needed <= front_len - needed {
                let mut head = pool.acquire();
                head.write(&front.as_slice()[..needed]);
                front.consume(needed);
                taken.segments.push_back(head);
            } else if let Some(mut segment) = self.segments.pop_front() {
                let mut tail = pool.acquire();
                tail.write(&segment.as_slice()[needed..]);
                segment.truncate(needed);
                taken.segments.push_back(segment);
                self.segments.push_front(tail);
            }
            break;
        }

        taken
    }

    /// Splits off whole segments from the front, up to `max` bytes in total.
    ///
    /// Only copies when the first segment alone is larger than `max`, in
    /// which case its first `max` bytes are copied out. May return fewer than
    /// `max` bytes even when more are available.
    pub fn split_at_most(&mut self, pool: &SegmentPool, max: usize) -> MultiBuffer {
        let mut taken = MultiBuffer::new();
        let Some(front) = self.segments.front_mut() else {
            return taken;
        };

        if front.len() > max {
            if max > 0 {
                let mut head = pool.acquire();
                head.write(&front.as_slice()[..max]);
                front.consume(max);
                taken.segments.push_back(head);
            }
            return taken;
        }

        let mut total = 0;
        while let Some(front) = self.segments.front() {
            if total + front.len() > max {
                break;
            }
            total += front.len();
            if let Some(segment) = self.segments.pop_front() {
                taken.segments.push_back(segment);
            }
        }
        taken
    }

    /// Detaches the first segment.
    pub fn split_first(&mut self) -> Option<Segment> {
        self.segments.pop_front()
    }

    /// Moves up to `dst.len()` bytes from the front into `dst`, releasing
    /// fully drained segments. Returns the number of bytes written.
    pub fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let mut written = 0;
        while written < dst.len() {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            written += front.read(&mut dst[written..]);
            if front.is_empty() {
                self.segments.pop_front();
            }
        }
        written
    }

    /// Copies up to `dst.len()` bytes from the front into `dst` without
    /// consuming them.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let mut total = 0;
        for segment in self.segments.iter() {
            let bytes = segment.as_slice();
            let n = std::cmp::min(bytes.len(), dst.len() - total);
            dst[total..total + n].copy_from_slice(&bytes[..n]);
            total += n;
            if n < bytes.len() {
                break;
            }
        }
        total
    }

    /// Content of the first segment, or an empty slice.
    pub fn front_slice(&self) -> &[u8] {
        match self.segments.front() {
            Some(segment) => segment.as_slice(),
            None => &[],
        }
    }

    /// Discards up to `n` bytes from the front.
    pub fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            let amount = std::cmp::min(n, front.len());
            front.consume(amount);
            n -= amount;
            if front.is_empty() {
                self.segments.pop_front();
            }
        }
    }

    /// Returns every segment to its pool.
    pub fn release(&mut self) {
        self.segments.clear();
    }

    /// Flattens the chain into one vector, releasing the segments.
    pub fn into_vec(mut self) -> Vec<u8> {
        let mut ret = vec![0u8; self.len()];
        let n = self.drain_into(&mut ret);
        debug_assert_eq!(n, ret.len());
        ret
    }

    /// Reads `reader` until end of input.
    ///
    /// A zero-length read or an `UnexpectedEof` error both count as end of
    /// input. Any other error is returned together with everything read up to
    /// that point.
    pub fn read_from<R: Read + ?Sized>(
        pool: &SegmentPool,
        reader: &mut R,
    ) -> Result<MultiBuffer, PartialRead> {
        let mut mb = MultiBuffer::new();
        loop {
            let mut segment = pool.acquire();
            let result = segment.fill_from(reader);
            mb.push_segment(segment);
            match result {
                Ok(true) => continue,
                Ok(false) => return Ok(mb),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(mb),
                Err(error) => {
                    return Err(PartialRead {
                        partial: mb,
                        error,
                    })
                }
            }
        }
    }

    /// Async version of `read_from`. Only suspends on `reader`.
    pub async fn read_from_async<R: AsyncRead + Unpin + ?Sized>(
        pool: &SegmentPool,
        reader: &mut R,
    ) -> Result<MultiBuffer, PartialRead> {
        let mut mb = MultiBuffer::new();
        let mut segment = pool.acquire();
        loop {
            if segment.is_full() {
                mb.push_segment(std::mem::replace(&mut segment, pool.acquire()));
            }
            match reader.read(segment.write_slice()).await {
                Ok(0) => break,
                Ok(n) => segment.advance_write(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(error) => {
                    mb.push_segment(segment);
                    return Err(PartialRead {
                        partial: mb,
                        error,
                    });
                }
            }
        }
        mb.push_segment(segment);
        Ok(mb)
    }

    /// Reads everything from `reader` into a flat vector.
    pub fn read_all_to_vec<R: Read + ?Sized>(
        pool: &SegmentPool,
        reader: &mut R,
    ) -> std::io::Result<Vec<u8>> {
        let mb = Self::read_from(pool, reader).map_err(|e| e.error)?;
        Ok(mb.into_vec())
    }
}

impl std::fmt::Debug for MultiBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiBuffer")
            .field("len", &self.len())
            .field("segments", &self.segments.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buf::SEGMENT_SIZE;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn assert_invariants(mb: &MultiBuffer) {
        let sum: usize = mb.segments().map(Segment::len).sum();
        assert_eq!(mb.len(), sum);
        assert!(mb.segments().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_split_by_length_small() {
        let pool = SegmentPool::new(16);
        let mut mb = MultiBuffer::from_bytes(&pool, b"abcdefg");
        let taken = mb.split_by_length(&pool, 3);
        assert_eq!(mb.len(), 4);
        assert_eq!(taken.len(), 3);
        assert_eq!(taken.into_vec(), b"abc");
        assert_eq!(mb.into_vec(), b"defg");
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_split_by_length_copies_smaller_side() {
        let pool = SegmentPool::new(16);
        let data = pattern(SEGMENT_SIZE);

        // Split point near the end: the original segment moves to `taken`.
        let mut mb = MultiBuffer::from_bytes(&pool, &data);
        let taken = mb.split_by_length(&pool, SEGMENT_SIZE - 10);
        assert_eq!(taken.front_slice().len(), SEGMENT_SIZE - 10);
        assert_eq!(mb.front_slice(), &data[SEGMENT_SIZE - 10..]);

        let mut taken = taken;
        taken.merge(&mut mb);
        assert_eq!(taken.into_vec(), data);
    }

    #[test]
    fn test_split_then_merge_restores() {
        let pool = SegmentPool::new(64);
        let data = pattern(SEGMENT_SIZE * 3 + 123);
        let offsets = [
            0,
            1,
            100,
            SEGMENT_SIZE,
            SEGMENT_SIZE + 1,
            SEGMENT_SIZE * 2 + 5000,
            data.len(),
            data.len() + 10,
        ];
        for n in offsets {
            let mut mb = MultiBuffer::from_bytes(&pool, &data);
            let mut taken = mb.split_by_length(&pool, n);
            assert_invariants(&mb);
            assert_invariants(&taken);
            assert_eq!(taken.len(), std::cmp::min(n, data.len()));
            assert_eq!(mb.len(), data.len() - taken.len());
            taken.merge(&mut mb);
            assert!(mb.is_empty());
            assert_eq!(taken.into_vec(), data, "split at {}", n);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_append_fills_tail_first() {
        let pool = SegmentPool::new(16);
        let mut mb = MultiBuffer::new();
        mb.append_bytes(&pool, b"hello");
        mb.append_bytes(&pool, b" world");
        assert_eq!(mb.segment_count(), 1);

        mb.append_bytes(&pool, &pattern(SEGMENT_SIZE));
        assert_eq!(mb.segment_count(), 2);
        assert_eq!(mb.len(), SEGMENT_SIZE + 11);
        assert_invariants(&mb);
    }

    #[test]
    fn test_merge_moves_segments() {
        let pool = SegmentPool::new(16);
        let mut a = MultiBuffer::from_bytes(&pool, b"abc");
        let mut b = MultiBuffer::from_bytes(&pool, b"def");
        a.merge(&mut b);
        assert!(b.is_empty());
        assert_eq!(a.segment_count(), 2);
        assert_eq!(a.into_vec(), b"abcdef");
    }

    #[test]
    fn test_split_first() {
        let pool = SegmentPool::new(16);
        let mut mb = MultiBuffer::new();
        assert!(mb.split_first().is_none());

        let mut other = MultiBuffer::from_bytes(&pool, b"second");
        mb.append_bytes(&pool, b"first");
        mb.merge(&mut other);
        let first = mb.split_first().unwrap();
        assert_eq!(first.as_slice(), b"first");
        assert_eq!(mb.into_vec(), b"second");
    }

    #[test]
    fn test_split_at_most() {
        let pool = SegmentPool::new(16);
        let mut mb = MultiBuffer::from_bytes(&pool, b"abcdefg");
        let taken = mb.split_at_most(&pool, 3);
        assert_eq!(taken.into_vec(), b"abc");
        assert_eq!(mb.len(), 4);

        let mut mb = MultiBuffer::from_bytes(&pool, &pattern(SEGMENT_SIZE * 2 + 10));
        let taken = mb.split_at_most(&pool, SEGMENT_SIZE + 100);
        assert_eq!(taken.len(), SEGMENT_SIZE);
        assert_eq!(mb.len(), SEGMENT_SIZE + 10);

        let taken = mb.split_at_most(&pool, 0);
        assert!(taken.is_empty());
    }

    #[test]
    fn test_drain_into_releases() {
        let pool = SegmentPool::new(16);
        let data = pattern(SEGMENT_SIZE + 50);
        let mut mb = MultiBuffer::from_bytes(&pool, &data);
        assert_eq!(pool.outstanding(), 2);

        let mut out = vec![0u8; SEGMENT_SIZE + 10];
        assert_eq!(mb.drain_into(&mut out), SEGMENT_SIZE + 10);
        assert_eq!(&out[..], &data[..SEGMENT_SIZE + 10]);
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(mb.len(), 40);

        let mut out = vec![0u8; 100];
        assert_eq!(mb.drain_into(&mut out), 40);
        assert!(mb.is_empty());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_copy_to_does_not_consume() {
        let pool = SegmentPool::new(16);
        let mut other = MultiBuffer::from_bytes(&pool, b"defg");
        let mut mb = MultiBuffer::from_bytes(&pool, b"abc");
        mb.merge(&mut other);

        let mut out = [0u8; 5];
        assert_eq!(mb.copy_to(&mut out), 5);
        assert_eq!(&out, b"abcde");
        assert_eq!(mb.len(), 7);
    }

    #[test]
    fn test_consume() {
        let pool = SegmentPool::new(16);
        let mut other = MultiBuffer::from_bytes(&pool, b"defg");
        let mut mb = MultiBuffer::from_bytes(&pool, b"abc");
        mb.merge(&mut other);
        mb.consume(4);
        assert_eq!(mb.segment_count(), 1);
        assert_eq!(mb.into_vec(), b"efg");
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = SegmentPool::new(16);
        let mut mb = MultiBuffer::from_bytes(&pool, &pattern(SEGMENT_SIZE * 2));
        mb.release();
        assert!(mb.is_empty());
        assert_eq!(pool.outstanding(), 0);
        mb.release();
        assert_eq!(mb.len(), 0);
    }

    #[test]
    fn test_read_from_until_eof() {
        let pool = SegmentPool::new(16);
        let data = pattern(SEGMENT_SIZE * 2 + 7);
        let mut reader: &[u8] = &data;
        let mb = MultiBuffer::read_from(&pool, &mut reader).unwrap();
        assert_eq!(mb.segment_count(), 3);
        assert_eq!(mb.into_vec(), data);
        assert_eq!(pool.outstanding(), 0);
    }

    struct FailingReader {
        remaining: Vec<u8>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.remaining.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                ));
            }
            let n = std::cmp::min(buf.len(), self.remaining.len());
            buf[..n].copy_from_slice(&self.remaining[..n]);
            self.remaining.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn test_read_from_returns_partial_on_error() {
        let pool = SegmentPool::new(16);
        let mut reader = FailingReader {
            remaining: b"partial".to_vec(),
        };
        let err = MultiBuffer::read_from(&pool, &mut reader).unwrap_err();
        assert_eq!(err.error.kind(), std::io::ErrorKind::ConnectionReset);
        assert_eq!(err.partial.into_vec(), b"partial");
    }

    #[test]
    fn test_read_all_to_vec() {
        let pool = SegmentPool::new(16);
        let mut reader: &[u8] = b"";
        assert!(MultiBuffer::read_all_to_vec(&pool, &mut reader)
            .unwrap()
            .is_empty());
        let mut reader: &[u8] = b"content";
        assert_eq!(
            MultiBuffer::read_all_to_vec(&pool, &mut reader).unwrap(),
            b"content"
        );
    }

    #[tokio::test]
    async fn test_read_from_async() {
        let pool = SegmentPool::new(16);
        let data = pattern(SEGMENT_SIZE * 3);
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let send = data.clone();
        let task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            writer.write_all(&send).await.unwrap();
        });
        let mb = MultiBuffer::read_from_async(&pool, &mut reader).await.unwrap();
        task.await.unwrap();
        assert_eq!(mb.len(), data.len());
        assert_eq!(mb.into_vec(), data);
    }
}
