use std::io::{Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::multi_buffer::MultiBuffer;
use super::segment_pool::SegmentPool;

/// An in-memory byte pipe backed by a chain. Writes append, reads drain,
/// and reading an empty container reports end of input.
#[derive(Debug)]
pub struct MultiBufferContainer {
    pool: SegmentPool,
    buffer: MultiBuffer,
}

impl MultiBufferContainer {
    pub fn new(pool: SegmentPool) -> Self {
        Self {
            pool,
            buffer: MultiBuffer::new(),
        }
    }

    pub fn with_buffer(pool: SegmentPool, buffer: MultiBuffer) -> Self {
        Self { pool, buffer }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Takes the whole chain out, leaving the container empty.
    pub fn read_buffer(&mut self) -> MultiBuffer {
        std::mem::take(&mut self.buffer)
    }

    /// Appends `mb` without copying.
    pub fn write_buffer(&mut self, mut mb: MultiBuffer) {
        self.buffer.merge(&mut mb);
    }

    /// Releases everything still buffered.
    pub fn close(&mut self) {
        self.buffer.release();
    }
}

impl Read for MultiBufferContainer {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.buffer.drain_into(buf))
    }
}

impl Write for MultiBufferContainer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.append_bytes(&self.pool, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for MultiBufferContainer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let n = this.buffer.drain_into(buf.initialize_unfilled());
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MultiBufferContainer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        this.buffer.append_bytes(&this.pool, buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let pool = SegmentPool::new(8);
        let mut container = MultiBufferContainer::new(pool);
        container.write_all(b"hello world").unwrap();
        assert_eq!(container.len(), 11);

        let mut out = [0u8; 5];
        assert_eq!(container.read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"hello");

        let mut rest = Vec::new();
        container.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b" world");
        assert_eq!(container.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_buffer_in_and_out() {
        let pool = SegmentPool::new(8);
        let mut container = MultiBufferContainer::new(pool.clone());
        container.write_buffer(MultiBuffer::from_bytes(&pool, b"abc"));
        container.write_buffer(MultiBuffer::from_bytes(&pool, b"def"));
        let mb = container.read_buffer();
        assert!(container.is_empty());
        assert_eq!(mb.into_vec(), b"abcdef");
    }

    #[test]
    fn test_close_releases() {
        let pool = SegmentPool::new(8);
        let mut container = MultiBufferContainer::new(pool.clone());
        container.write_all(&[1u8; 20000]).unwrap();
        assert_eq!(pool.outstanding(), 3);
        container.close();
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_async_read_write() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let pool = SegmentPool::new(8);
        let mut container = MultiBufferContainer::new(pool);
        AsyncWriteExt::write_all(&mut container, b"async data")
            .await
            .unwrap();
        let mut out = Vec::new();
        AsyncReadExt::read_to_end(&mut container, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"async data");
    }
}
