use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream the codec layers can wrap and box.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}
