use std::io;

/// Errors produced by the shadowsocks codec and the buffer I/O helpers.
///
/// Buffer operations that cannot fail (append, merge, split) never return
/// this type. Allocation failure is not represented: the process aborts.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown cipher: {0}")]
    InvalidCipherKind(String),
    #[error("unknown header disguise: {0}")]
    InvalidDisguise(String),
    #[error("one-time auth is only supported with stream ciphers, not {0}")]
    OtaNotSupported(&'static str),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("chunk length {0} is larger than the max allowed size")]
    ChunkTooLarge(usize),
    #[error("packet of {0} bytes does not fit in a datagram")]
    PacketTooLarge(usize),
    #[error("input ended in the middle of a frame")]
    ShortRead,
    #[error("got duplicate salt")]
    ReplayedSalt,
    #[error("session is closed")]
    SessionClosed,
    #[error("cipher operation failed: {0}")]
    Crypto(&'static str),
    #[error("{0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl From<CodecError> for io::Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(e) => e,
            CodecError::InvalidCipherKind(_)
            | CodecError::InvalidDisguise(_)
            | CodecError::OtaNotSupported(_)
            | CodecError::PacketTooLarge(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            CodecError::ShortRead => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            CodecError::SessionClosed => io::Error::new(io::ErrorKind::BrokenPipe, e),
            CodecError::Crypto(_) => io::Error::other(e),
            CodecError::AuthenticationFailed
            | CodecError::ChunkTooLarge(_)
            | CodecError::ReplayedSalt => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds() {
        let e: io::Error = CodecError::AuthenticationFailed.into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);

        let e: io::Error = CodecError::ShortRead.into();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);

        let e: io::Error = CodecError::InvalidCipherKind("rc4".into()).into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
        assert!(e.to_string().contains("rc4"));

        let e: io::Error = CodecError::InvalidDisguise("http".into()).into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);

        let e: io::Error = CodecError::PacketTooLarge(70000).into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_io_error_passthrough() {
        let inner = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let e: io::Error = CodecError::from(inner).into();
        assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(e.to_string(), "connection reset");
    }
}
