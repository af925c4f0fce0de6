use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::aead_util::MAX_AEAD_PAYLOAD_LEN;
use super::shadowsocks_decoder::ShadowsocksDecoder;
use super::shadowsocks_encoder::ShadowsocksEncoder;
use super::shadowsocks_session::ShadowsocksSession;
use crate::async_stream::AsyncStream;
use crate::buf::{MultiBuffer, SegmentPool};

// Plaintext accepted per write call. Bounds how much ciphertext is cached
// while the inner stream is not writable.
const MAX_WRITE_LEN: usize = 4 * MAX_AEAD_PAYLOAD_LEN;

pub struct ShadowsocksStream {
    stream: Box<dyn AsyncStream>,
    pool: SegmentPool,

    encoder: ShadowsocksEncoder,
    decoder: ShadowsocksDecoder,

    // decrypted, waiting for the reader
    read_plaintext: MultiBuffer,
    // encrypted, waiting for the inner stream
    write_cache: MultiBuffer,

    is_eof: bool,
}

impl ShadowsocksStream {
    pub fn new(
        stream: Box<dyn AsyncStream>,
        session: ShadowsocksSession,
        pool: SegmentPool,
    ) -> Self {
        let (encoder, decoder) = session.into_parts();
        Self {
            stream,
            pool,
            encoder,
            decoder,
            read_plaintext: MultiBuffer::new(),
            write_cache: MultiBuffer::new(),
            is_eof: false,
        }
    }

    fn close(&mut self) {
        self.encoder.close();
        self.decoder.close();
        self.read_plaintext.release();
        self.write_cache.release();
    }

    fn do_write_cache(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        while !self.write_cache.is_empty() {
            let written = ready!(
                Pin::new(&mut self.stream).poll_write(cx, self.write_cache.front_slice())
            )?;
            if written == 0 {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "EOF while writing cached encrypted data",
                )));
            }
            self.write_cache.consume(written);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for ShadowsocksStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.read_plaintext.is_empty() {
                let len = this.read_plaintext.drain_into(buf.initialize_unfilled());
                buf.advance(len);
                return Poll::Ready(Ok(()));
            }

            if this.is_eof {
                return Poll::Ready(Ok(()));
            }

            // An unfinished read leaves the segment to go back to the pool.
            let mut segment = this.pool.acquire();
            let len = {
                let mut read_buf = ReadBuf::new(segment.write_slice());
                ready!(Pin::new(&mut this.stream).poll_read(cx, &mut read_buf))?;
                read_buf.filled().len()
            };

            if len == 0 {
                this.is_eof = true;
                if let Err(e) = this.decoder.finish() {
                    this.close();
                    return Poll::Ready(Err(e.into()));
                }
                continue;
            }

            segment.advance_write(len);
            let mut ciphertext = MultiBuffer::new();
            ciphertext.push_segment(segment);

            match this.decoder.decrypt(&this.pool, ciphertext) {
                Ok(mut plaintext) => this.read_plaintext.merge(&mut plaintext),
                Err(e) => {
                    this.close();
                    return Poll::Ready(Err(e.into()));
                }
            }
        }
    }
}

impl AsyncWrite for ShadowsocksStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();

        if !this.write_cache.is_empty() {
            ready!(this.do_write_cache(cx))?;
        }

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let len = buf.len().min(MAX_WRITE_LEN);
        let plaintext = MultiBuffer::from_bytes(&this.pool, &buf[..len]);
        match this.encoder.encrypt(&this.pool, plaintext) {
            Ok(mut ciphertext) => this.write_cache.merge(&mut ciphertext),
            Err(e) => {
                this.close();
                return Poll::Ready(Err(e.into()));
            }
        }

        // The data is accepted either way; whatever the inner stream does not
        // take now goes out on the next write or flush.
        if let Poll::Ready(Err(e)) = this.do_write_cache(cx) {
            return Poll::Ready(Err(e));
        }

        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        ready!(this.do_write_cache(cx))?;
        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        ready!(this.do_write_cache(cx))?;
        this.encoder.close();
        Pin::new(&mut this.stream).poll_shutdown(cx)
    }
}
