use serde::Deserialize;

use super::disguised_stream::DisguisedStream;
use crate::async_stream::AsyncStream;
use crate::buf::{MultiBuffer, SegmentPool};
use crate::error::{CodecError, Result};

/// Largest header any disguise writes.
pub const MAX_HEADER_SIZE: usize = 13;

/// A fixed-size decoy prefix sent once at the start of a connection so the
/// first bytes on the wire look like a different, commonly allowed protocol.
///
/// The header carries no information and is not negotiated: both peers have
/// to be configured with the same disguise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderDisguise {
    #[default]
    None,
    /// SRTP packet header.
    Srtp,
    /// uTP (BitTorrent micro transport) data packet header.
    Utp,
    /// WeChat video call packet header.
    WechatVideo,
    /// DTLS 1.2 application data record header.
    Dtls,
    /// WireGuard transport data message type.
    Wireguard,
}

impl HeaderDisguise {
    pub fn name(&self) -> &'static str {
        match self {
            HeaderDisguise::None => "none",
            HeaderDisguise::Srtp => "srtp",
            HeaderDisguise::Utp => "utp",
            HeaderDisguise::WechatVideo => "wechat-video",
            HeaderDisguise::Dtls => "dtls",
            HeaderDisguise::Wireguard => "wireguard",
        }
    }

    /// Number of bytes the header adds to a connection.
    pub fn overhead_size(&self) -> usize {
        match self {
            HeaderDisguise::None => 0,
            HeaderDisguise::Srtp | HeaderDisguise::Utp | HeaderDisguise::Wireguard => 4,
            HeaderDisguise::WechatVideo | HeaderDisguise::Dtls => 13,
        }
    }

    /// Writes exactly `overhead_size()` bytes at the start of `buf`.
    ///
    /// Fields that would vary in the real protocol (connection ids, sequence
    /// numbers, epochs) are randomized on every call.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than `overhead_size()`.
    pub fn serialize(&self, buf: &mut [u8]) {
        match self {
            HeaderDisguise::None => {}
            HeaderDisguise::Srtp => {
                // version 2, padding, extension, 8 CSRCs, marker, payload type 0x68
                buf[0..2].copy_from_slice(&0xb5e8u16.to_be_bytes());
                buf[2..4].copy_from_slice(&rand::random::<u16>().to_be_bytes());
            }
            HeaderDisguise::Utp => {
                buf[0..2].copy_from_slice(&rand::random::<u16>().to_be_bytes());
                // ST_DATA, version 1, no extension
                buf[2] = 1;
                buf[3] = 0;
            }
            HeaderDisguise::WechatVideo => {
                buf[0] = 0xa1;
                buf[1] = 0x08;
                buf[2..6].copy_from_slice(&u32::from(rand::random::<u16>()).to_be_bytes());
                buf[6..13].copy_from_slice(&[0x00, 0x10, 0x11, 0x18, 0x30, 0x22, 0x30]);
            }
            HeaderDisguise::Dtls => {
                // content type application_data, version DTLS 1.2
                buf[0] = 23;
                buf[1] = 254;
                buf[2] = 253;
                buf[3..5].copy_from_slice(&rand::random::<u16>().to_be_bytes());
                // 48-bit sequence number, starting low like a fresh epoch
                buf[5] = 0;
                buf[6] = 0;
                buf[7..11].copy_from_slice(&u32::from(rand::random::<u8>()).to_be_bytes());
                let length = 17 + u16::from(rand::random::<u8>() % 84);
                buf[11..13].copy_from_slice(&length.to_be_bytes());
            }
            HeaderDisguise::Wireguard => {
                buf[0..4].copy_from_slice(&[0x04, 0x00, 0x00, 0x00]);
            }
        }
    }

    /// Prefixes `payload` with a freshly serialized header. The payload's
    /// segments are moved, not copied.
    pub fn frame(&self, pool: &SegmentPool, mut payload: MultiBuffer) -> MultiBuffer {
        let size = self.overhead_size();
        if size == 0 {
            return payload;
        }
        let mut segment = pool.acquire();
        self.serialize(segment.extend(size));
        let mut framed = MultiBuffer::new();
        framed.push_segment(segment);
        framed.merge(&mut payload);
        framed
    }

    /// Puts a `DisguisedStream` around `stream`, or returns it unchanged for
    /// `None`.
    pub fn wrap(&self, stream: Box<dyn AsyncStream>) -> Box<dyn AsyncStream> {
        match self {
            HeaderDisguise::None => stream,
            _ => Box::new(DisguisedStream::new(stream, *self)),
        }
    }

    /// Drops the header from the front of `chain`.
    pub fn strip(&self, chain: &mut MultiBuffer) -> Result<()> {
        let size = self.overhead_size();
        if chain.len() < size {
            return Err(CodecError::ShortRead);
        }
        chain.consume(size);
        Ok(())
    }
}

impl TryFrom<&str> for HeaderDisguise {
    type Error = CodecError;

    fn try_from(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(HeaderDisguise::None),
            "srtp" => Ok(HeaderDisguise::Srtp),
            "utp" => Ok(HeaderDisguise::Utp),
            "wechat-video" => Ok(HeaderDisguise::WechatVideo),
            "dtls" => Ok(HeaderDisguise::Dtls),
            "wireguard" => Ok(HeaderDisguise::Wireguard),
            _ => Err(CodecError::InvalidDisguise(name.to_string())),
        }
    }
}
