use std::sync::Arc;

use log::debug;
use rand::RngCore;
use ring::aead::{Aad, SealingKey};

use super::aead_util::{new_sealing_key, IncreasingSequence, MAX_AEAD_PAYLOAD_LEN, TAG_LEN};
use super::one_time_auth::{ChunkAuthenticator, MAX_OTA_PAYLOAD_LEN, OTA_HEADER_LEN, OTA_TAG_LEN};
use super::shadowsocks_cipher::{ShadowsocksCipher, MAX_SALT_LEN};
use super::shadowsocks_key::ShadowsocksKey;
use super::shadowsocks_session::SessionPhase;
use super::stream_cipher::StreamEncryptor;
use crate::buf::{MultiBuffer, SegmentPool};
use crate::error::{CodecError, Result};

const AEAD_FRAME_LEN: usize = 2 + TAG_LEN + MAX_AEAD_PAYLOAD_LEN + TAG_LEN;
const OTA_FRAME_LEN: usize = OTA_HEADER_LEN + MAX_OTA_PAYLOAD_LEN;

enum EncoderState {
    Uninitialized,
    Aead(SealingKey<IncreasingSequence>),
    Stream {
        encryptor: StreamEncryptor,
        auth: Option<ChunkAuthenticator>,
    },
    Plain,
    Closed,
}

pub struct ShadowsocksEncoder {
    cipher: ShadowsocksCipher,
    key: Arc<dyn ShadowsocksKey>,
    ota: bool,
    state: EncoderState,
    // one full frame, only allocated for ciphers that frame
    scratch: Box<[u8]>,
    chunks: u64,
}

impl ShadowsocksEncoder {
    pub fn new(cipher: ShadowsocksCipher, key: Arc<dyn ShadowsocksKey>, ota: bool) -> Self {
        Self {
            cipher,
            key,
            ota,
            state: EncoderState::Uninitialized,
            scratch: Box::default(),
            chunks: 0,
        }
    }

    pub fn cipher(&self) -> ShadowsocksCipher {
        self.cipher
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            EncoderState::Uninitialized => SessionPhase::Uninitialized,
            EncoderState::Closed => SessionPhase::Closed,
            _ if self.chunks == 0 => SessionPhase::SaltExchanged,
            _ => SessionPhase::Streaming,
        }
    }

    /// Encrypts `plaintext` and returns the bytes to put on the wire. The
    /// first call also emits the salt, even when `plaintext` is empty.
    ///
    /// Any failure closes the encoder.
    pub fn encrypt(&mut self, pool: &SegmentPool, plaintext: MultiBuffer) -> Result<MultiBuffer> {
        if matches!(self.state, EncoderState::Closed) {
            return Err(CodecError::SessionClosed);
        }
        let mut output = MultiBuffer::new();
        match self.encrypt_inner(pool, plaintext, &mut output) {
            Ok(()) => Ok(output),
            Err(e) => {
                debug!("{} encoder failed: {}", self.cipher, e);
                self.close();
                Err(e)
            }
        }
    }

    pub fn close(&mut self) {
        self.state = EncoderState::Closed;
    }

    fn initialize(&mut self, pool: &SegmentPool, output: &mut MultiBuffer) -> Result<()> {
        let salt_len = self.cipher.salt_len();
        let mut salt = [0u8; MAX_SALT_LEN];
        let salt = &mut salt[..salt_len];
        rand::rng().fill_bytes(salt);

        self.state = if let Some(algorithm) = self.cipher.aead_algorithm() {
            let session_key = self.key.create_session_key(salt)?;
            self.scratch = vec![0u8; AEAD_FRAME_LEN].into_boxed_slice();
            EncoderState::Aead(new_sealing_key(algorithm, &session_key)?)
        } else if self.cipher.is_stream() {
            let encryptor = StreamEncryptor::new(self.cipher, self.key.master_key(), salt)?;
            let auth = if self.ota {
                self.scratch = vec![0u8; OTA_FRAME_LEN].into_boxed_slice();
                Some(ChunkAuthenticator::new(salt))
            } else {
                None
            };
            EncoderState::Stream { encryptor, auth }
        } else {
            EncoderState::Plain
        };

        output.append_bytes(pool, salt);
        Ok(())
    }

    fn encrypt_inner(
        &mut self,
        pool: &SegmentPool,
        mut plaintext: MultiBuffer,
        output: &mut MultiBuffer,
    ) -> Result<()> {
        if matches!(self.state, EncoderState::Uninitialized) {
            self.initialize(pool, output)?;
        }

        let Self {
            state,
            scratch,
            chunks,
            ..
        } = self;

        match state {
            EncoderState::Aead(sealing_key) => {
                let payload_start = 2 + TAG_LEN;
                while !plaintext.is_empty() {
                    let payload_len = plaintext.drain_into(
                        &mut scratch[payload_start..payload_start + MAX_AEAD_PAYLOAD_LEN],
                    );

                    scratch[0..2].copy_from_slice(&(payload_len as u16).to_be_bytes());
                    let tag = sealing_key
                        .seal_in_place_separate_tag(Aad::empty(), &mut scratch[0..2])
                        .map_err(|_| CodecError::Crypto("seal failed"))?;
                    scratch[2..payload_start].copy_from_slice(tag.as_ref());

                    let payload_end = payload_start + payload_len;
                    let tag = sealing_key
                        .seal_in_place_separate_tag(
                            Aad::empty(),
                            &mut scratch[payload_start..payload_end],
                        )
                        .map_err(|_| CodecError::Crypto("seal failed"))?;
                    scratch[payload_end..payload_end + TAG_LEN].copy_from_slice(tag.as_ref());

                    output.append_bytes(pool, &scratch[..payload_end + TAG_LEN]);
                    *chunks += 1;
                }
            }
            EncoderState::Stream {
                encryptor,
                auth: Some(auth),
            } => {
                while !plaintext.is_empty() {
                    let payload_len = plaintext.drain_into(
                        &mut scratch[OTA_HEADER_LEN..OTA_HEADER_LEN + MAX_OTA_PAYLOAD_LEN],
                    );
                    let frame_len = OTA_HEADER_LEN + payload_len;

                    let (header, payload) = scratch[..frame_len].split_at_mut(OTA_HEADER_LEN);
                    header[0..2].copy_from_slice(&(payload_len as u16).to_be_bytes());
                    let mut tag = [0u8; OTA_TAG_LEN];
                    auth.sign(payload, &mut tag)?;
                    header[2..].copy_from_slice(&tag);

                    encryptor.apply(&mut scratch[..frame_len]);
                    output.append_bytes(pool, &scratch[..frame_len]);
                    *chunks += 1;
                }
            }
            EncoderState::Stream {
                encryptor,
                auth: None,
            } => {
                // No framing: encrypt the segments where they are and hand
                // them over.
                if !plaintext.is_empty() {
                    for segment in plaintext.segments_mut() {
                        encryptor.apply(segment.as_mut_slice());
                    }
                    output.merge(&mut plaintext);
                    *chunks += 1;
                }
            }
            EncoderState::Plain => {
                if !plaintext.is_empty() {
                    output.merge(&mut plaintext);
                    *chunks += 1;
                }
            }
            EncoderState::Uninitialized | EncoderState::Closed => {
                return Err(CodecError::SessionClosed);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadowsocks::default_key::DefaultKey;

    fn encoder(cipher: ShadowsocksCipher, ota: bool) -> ShadowsocksEncoder {
        let key: Arc<dyn ShadowsocksKey> = Arc::new(DefaultKey::new("test", cipher.key_len()));
        ShadowsocksEncoder::new(cipher, key, ota)
    }

    #[test]
    fn test_salt_sent_once() {
        let pool = SegmentPool::new(16);
        let mut encoder = encoder(ShadowsocksCipher::Aes256Gcm, false);
        assert_eq!(encoder.phase(), SessionPhase::Uninitialized);

        let first = encoder.encrypt(&pool, MultiBuffer::new()).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(encoder.phase(), SessionPhase::SaltExchanged);

        let second = encoder
            .encrypt(&pool, MultiBuffer::from_bytes(&pool, b"hello"))
            .unwrap();
        assert_eq!(second.len(), 5 + 34);
        assert_eq!(encoder.phase(), SessionPhase::Streaming);
    }

    #[test]
    fn test_aead_chunk_boundary() {
        let pool = SegmentPool::new(16);
        let cipher = ShadowsocksCipher::Aes128Gcm;

        let mut encoder = encoder(cipher, false);
        let data = vec![0x55u8; MAX_AEAD_PAYLOAD_LEN];
        let output = encoder
            .encrypt(&pool, MultiBuffer::from_bytes(&pool, &data))
            .unwrap();
        assert_eq!(output.len(), cipher.salt_len() + data.len() + 34);

        let mut encoder = self::encoder(cipher, false);
        let data = vec![0x55u8; MAX_AEAD_PAYLOAD_LEN + 1];
        let output = encoder
            .encrypt(&pool, MultiBuffer::from_bytes(&pool, &data))
            .unwrap();
        assert_eq!(output.len(), cipher.salt_len() + data.len() + 2 * 34);
    }

    #[test]
    fn test_stream_cipher_adds_only_iv() {
        let pool = SegmentPool::new(16);
        let mut encoder = encoder(ShadowsocksCipher::Chacha20Ietf, false);
        let output = encoder
            .encrypt(&pool, MultiBuffer::from_bytes(&pool, &[1u8; 20000]))
            .unwrap();
        assert_eq!(output.len(), 12 + 20000);
    }

    #[test]
    fn test_ota_overhead() {
        let pool = SegmentPool::new(16);
        let mut encoder = encoder(ShadowsocksCipher::Aes128Cfb, true);
        let output = encoder
            .encrypt(&pool, MultiBuffer::from_bytes(&pool, &[1u8; 20000]))
            .unwrap();
        assert_eq!(output.len(), 16 + 20000 + 2 * OTA_HEADER_LEN);
    }

    #[test]
    fn test_plain_passes_through() {
        let pool = SegmentPool::new(16);
        let mut encoder = encoder(ShadowsocksCipher::None, false);
        let output = encoder
            .encrypt(&pool, MultiBuffer::from_bytes(&pool, b"visible"))
            .unwrap();
        assert_eq!(output.into_vec(), b"visible");
    }

    #[test]
    fn test_salts_differ_between_sessions() {
        let pool = SegmentPool::new(16);
        let a = encoder(ShadowsocksCipher::Chacha20Poly1305, false)
            .encrypt(&pool, MultiBuffer::new())
            .unwrap()
            .into_vec();
        let b = encoder(ShadowsocksCipher::Chacha20Poly1305, false)
            .encrypt(&pool, MultiBuffer::new())
            .unwrap()
            .into_vec();
        assert_ne!(a, b);
    }

    #[test]
    fn test_closed_encoder() {
        let pool = SegmentPool::new(16);
        let mut encoder = encoder(ShadowsocksCipher::Aes256Gcm, false);
        encoder.close();
        assert!(matches!(
            encoder.encrypt(&pool, MultiBuffer::from_bytes(&pool, b"x")),
            Err(CodecError::SessionClosed)
        ));
        assert_eq!(encoder.phase(), SessionPhase::Closed);
    }
}
