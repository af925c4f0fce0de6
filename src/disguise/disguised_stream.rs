use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::header_disguise::{HeaderDisguise, MAX_HEADER_SIZE};
use crate::async_stream::AsyncStream;

/// Writes a disguise header before the first written byte and strips the
/// peer's header from the first bytes read.
pub struct DisguisedStream {
    stream: Box<dyn AsyncStream>,

    header: [u8; MAX_HEADER_SIZE],
    header_start_offset: usize,
    header_end_offset: usize,

    skip_remaining: usize,
    skip_started: bool,
}

impl DisguisedStream {
    pub fn new(stream: Box<dyn AsyncStream>, disguise: HeaderDisguise) -> Self {
        let size = disguise.overhead_size();
        let mut header = [0u8; MAX_HEADER_SIZE];
        disguise.serialize(&mut header[..size]);
        Self {
            stream,
            header,
            header_start_offset: 0,
            header_end_offset: size,
            skip_remaining: size,
            skip_started: false,
        }
    }

    fn poll_write_header(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        while self.header_start_offset < self.header_end_offset {
            let written = ready!(Pin::new(&mut self.stream).poll_write(
                cx,
                &self.header[self.header_start_offset..self.header_end_offset]
            ))?;
            if written == 0 {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "EOF while writing disguise header",
                )));
            }
            self.header_start_offset += written;
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for DisguisedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        while this.skip_remaining > 0 {
            let mut scratch = [0u8; MAX_HEADER_SIZE];
            let mut read_buf = ReadBuf::new(&mut scratch[..this.skip_remaining]);
            ready!(Pin::new(&mut this.stream).poll_read(cx, &mut read_buf))?;
            let len = read_buf.filled().len();
            if len == 0 {
                if !this.skip_started {
                    // Peer closed without sending anything.
                    return Poll::Ready(Ok(()));
                }
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "EOF while reading disguise header",
                )));
            }
            this.skip_started = true;
            this.skip_remaining -= len;
        }

        Pin::new(&mut this.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for DisguisedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();
        ready!(this.poll_write_header(cx))?;
        Pin::new(&mut this.stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.header_start_offset > 0 {
            ready!(this.poll_write_header(cx))?;
        }
        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.header_start_offset > 0 {
            ready!(this.poll_write_header(cx))?;
        }
        Pin::new(&mut this.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_header_written_once() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = DisguisedStream::new(Box::new(client), HeaderDisguise::Utp);
        stream.write_all(b"first").await.unwrap();
        stream.write_all(b"second").await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len(), 4 + 11);
        assert_eq!(received[2], 1);
        assert_eq!(&received[4..], b"firstsecond");
    }

    #[tokio::test]
    async fn test_empty_write_sends_nothing() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = DisguisedStream::new(Box::new(client), HeaderDisguise::Wireguard);
        assert_eq!(stream.write(b"").await.unwrap(), 0);
        stream.flush().await.unwrap();
        drop(stream);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (client, server) = tokio::io::duplex(16);
        let mut writer = DisguisedStream::new(Box::new(client), HeaderDisguise::Dtls);
        let mut reader = DisguisedStream::new(Box::new(server), HeaderDisguise::Dtls);

        let task = tokio::spawn(async move {
            writer.write_all(b"hello through dtls").await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        task.await.unwrap();
        assert_eq!(received, b"hello through dtls");
    }

    #[tokio::test]
    async fn test_truncated_header() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = DisguisedStream::new(Box::new(server), HeaderDisguise::WechatVideo);
        client.write_all(&[0xa1, 0x08, 0, 0]).await.unwrap();
        drop(client);

        let mut received = Vec::new();
        let err = reader.read_to_end(&mut received).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_empty_connection() {
        let (client, server) = tokio::io::duplex(64);
        let mut reader = DisguisedStream::new(Box::new(server), HeaderDisguise::Srtp);
        drop(client);
        let mut received = Vec::new();
        assert_eq!(reader.read_to_end(&mut received).await.unwrap(), 0);
    }
}
