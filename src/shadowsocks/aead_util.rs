use ring::aead::{
    Algorithm, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, NONCE_LEN,
};
use ring::error::Unspecified;

use crate::error::{CodecError, Result};

pub const TAG_LEN: usize = 16;

// The length field is 2 bytes, but the top two bits are reserved.
pub const MAX_AEAD_PAYLOAD_LEN: usize = 0x3fff;

pub const AEAD_CHUNK_OVERHEAD: usize = 2 + 2 * TAG_LEN;

// Little-endian, advanced after every seal or open.
pub struct IncreasingSequence([u8; NONCE_LEN]);

impl IncreasingSequence {
    pub fn new() -> IncreasingSequence {
        IncreasingSequence([0u8; NONCE_LEN])
    }
}

impl NonceSequence for IncreasingSequence {
    fn advance(&mut self) -> std::result::Result<Nonce, Unspecified> {
        let ret = Nonce::assume_unique_for_key(self.0);
        for i in self.0.iter_mut() {
            *i = i.wrapping_add(1);
            if *i > 0 {
                break;
            }
        }
        Ok(ret)
    }
}

pub fn new_sealing_key(
    algorithm: &'static Algorithm,
    session_key: &[u8],
) -> Result<SealingKey<IncreasingSequence>> {
    let unbound_key = UnboundKey::new(algorithm, session_key)
        .map_err(|_| CodecError::Crypto("invalid session key length"))?;
    Ok(SealingKey::new(unbound_key, IncreasingSequence::new()))
}

pub fn new_opening_key(
    algorithm: &'static Algorithm,
    session_key: &[u8],
) -> Result<OpeningKey<IncreasingSequence>> {
    let unbound_key = UnboundKey::new(algorithm, session_key)
        .map_err(|_| CodecError::Crypto("invalid session key length"))?;
    Ok(OpeningKey::new(unbound_key, IncreasingSequence::new()))
}
