use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use ring::aead::{Aad, OpeningKey};

use super::aead_util::{new_opening_key, IncreasingSequence, MAX_AEAD_PAYLOAD_LEN, TAG_LEN};
use super::one_time_auth::{ChunkAuthenticator, MAX_OTA_PAYLOAD_LEN, OTA_TAG_LEN};
use super::salt_checker::SaltChecker;
use super::shadowsocks_cipher::{ShadowsocksCipher, MAX_SALT_LEN};
use super::shadowsocks_key::ShadowsocksKey;
use super::shadowsocks_session::SessionPhase;
use super::stream_cipher::StreamDecryptor;
use crate::buf::{MultiBuffer, SegmentPool};
use crate::error::{CodecError, Result};

const SCRATCH_LEN: usize = MAX_AEAD_PAYLOAD_LEN + TAG_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    AwaitingLength,
    AwaitingPayload(usize),
}

struct OtaReader {
    auth: ChunkAuthenticator,
    frame: FrameState,
    // decrypted but not yet authenticated
    unverified: MultiBuffer,
}

enum DecoderState {
    AwaitingSalt,
    Aead {
        opening_key: OpeningKey<IncreasingSequence>,
        frame: FrameState,
    },
    Stream {
        decryptor: StreamDecryptor,
        ota: Option<OtaReader>,
    },
    Plain,
    Closed,
}

/// The receiving half of a session.
///
/// Ciphertext may arrive split at any byte. Incomplete frames are held until
/// the rest arrives, and only authenticated plaintext is ever returned.
pub struct ShadowsocksDecoder {
    cipher: ShadowsocksCipher,
    key: Arc<dyn ShadowsocksKey>,
    ota: bool,
    salt_checker: Option<Arc<Mutex<dyn SaltChecker>>>,
    state: DecoderState,
    pending: MultiBuffer,
    scratch: Box<[u8]>,
    chunks: u64,
}

impl ShadowsocksDecoder {
    pub fn new(cipher: ShadowsocksCipher, key: Arc<dyn ShadowsocksKey>, ota: bool) -> Self {
        Self {
            cipher,
            key,
            ota,
            salt_checker: None,
            state: DecoderState::AwaitingSalt,
            pending: MultiBuffer::new(),
            scratch: Box::default(),
            chunks: 0,
        }
    }

    pub fn set_salt_checker(&mut self, salt_checker: Arc<Mutex<dyn SaltChecker>>) {
        self.salt_checker = Some(salt_checker);
    }

    pub fn cipher(&self) -> ShadowsocksCipher {
        self.cipher
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            DecoderState::AwaitingSalt => SessionPhase::Uninitialized,
            DecoderState::Closed => SessionPhase::Closed,
            _ if self.chunks == 0 => SessionPhase::SaltExchanged,
            _ => SessionPhase::Streaming,
        }
    }

    pub fn buffered_len(&self) -> usize {
        let unverified = match &self.state {
            DecoderState::Stream { ota: Some(ota), .. } => ota.unverified.len(),
            _ => 0,
        };
        self.pending.len() + unverified
    }

    /// Any failure closes the decoder and discards everything buffered.
    pub fn decrypt(
        &mut self,
        pool: &SegmentPool,
        mut ciphertext: MultiBuffer,
    ) -> Result<MultiBuffer> {
        if matches!(self.state, DecoderState::Closed) {
            return Err(CodecError::SessionClosed);
        }
        self.pending.merge(&mut ciphertext);

        let mut output = MultiBuffer::new();
        match self.decrypt_pending(pool, &mut output) {
            Ok(()) => Ok(output),
            Err(e) => {
                warn!("{} decoder failed after {} chunks: {}", self.cipher, self.chunks, e);
                self.close();
                Err(e)
            }
        }
    }

    pub fn finish(&mut self) -> Result<()> {
        let complete = match &self.state {
            DecoderState::Closed => return Err(CodecError::SessionClosed),
            DecoderState::AwaitingSalt => self.pending.is_empty(),
            DecoderState::Aead { frame, .. } => {
                *frame == FrameState::AwaitingLength && self.pending.is_empty()
            }
            DecoderState::Stream { ota: Some(ota), .. } => {
                ota.frame == FrameState::AwaitingLength && ota.unverified.is_empty()
            }
            DecoderState::Stream { ota: None, .. } | DecoderState::Plain => true,
        };
        if !complete {
            debug!(
                "{} input ended with {} bytes of an incomplete frame",
                self.cipher,
                self.buffered_len()
            );
            self.close();
            return Err(CodecError::ShortRead);
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.state = DecoderState::Closed;
        self.pending.release();
    }

    fn initialize(&mut self) -> Result<bool> {
        let salt_len = self.cipher.salt_len();
        if self.pending.len() < salt_len {
            return Ok(false);
        }
        let mut salt = [0u8; MAX_SALT_LEN];
        let salt = &mut salt[..salt_len];
        self.pending.drain_into(salt);

        if salt_len > 0 {
            if let Some(salt_checker) = &self.salt_checker {
                if !salt_checker.lock().insert_and_check(salt) {
                    return Err(CodecError::ReplayedSalt);
                }
            }
        }

        self.state = if let Some(algorithm) = self.cipher.aead_algorithm() {
            let session_key = self.key.create_session_key(salt)?;
            self.scratch = vec![0u8; SCRATCH_LEN].into_boxed_slice();
            DecoderState::Aead {
                opening_key: new_opening_key(algorithm, &session_key)?,
                frame: FrameState::AwaitingLength,
            }
        } else if self.cipher.is_stream() {
            let decryptor = StreamDecryptor::new(self.cipher, self.key.master_key(), salt)?;
            let ota = if self.ota {
                self.scratch = vec![0u8; OTA_TAG_LEN + MAX_OTA_PAYLOAD_LEN].into_boxed_slice();
                Some(OtaReader {
                    auth: ChunkAuthenticator::new(salt),
                    frame: FrameState::AwaitingLength,
                    unverified: MultiBuffer::new(),
                })
            } else {
                None
            };
            DecoderState::Stream { decryptor, ota }
        } else {
            DecoderState::Plain
        };
        Ok(true)
    }

    fn decrypt_pending(&mut self, pool: &SegmentPool, output: &mut MultiBuffer) -> Result<()> {
        if matches!(self.state, DecoderState::AwaitingSalt) && !self.initialize()? {
            return Ok(());
        }

        let Self {
            state,
            pending,
            scratch,
            chunks,
            ..
        } = self;

        match state {
            DecoderState::Aead { opening_key, frame } => loop {
                match *frame {
                    FrameState::AwaitingLength => {
                        let header = &mut scratch[..2 + TAG_LEN];
                        if pending.len() < header.len() {
                            return Ok(());
                        }
                        pending.drain_into(header);
                        let plain = opening_key
                            .open_in_place(Aad::empty(), header)
                            .map_err(|_| CodecError::AuthenticationFailed)?;
                        let payload_len = u16::from_be_bytes([plain[0], plain[1]]) as usize;
                        if payload_len > MAX_AEAD_PAYLOAD_LEN {
                            return Err(CodecError::ChunkTooLarge(payload_len));
                        }
                        *frame = FrameState::AwaitingPayload(payload_len);
                    }
                    FrameState::AwaitingPayload(payload_len) => {
                        let body = &mut scratch[..payload_len + TAG_LEN];
                        if pending.len() < body.len() {
                            return Ok(());
                        }
                        pending.drain_into(body);
                        let plain = opening_key
                            .open_in_place(Aad::empty(), body)
                            .map_err(|_| CodecError::AuthenticationFailed)?;
                        output.append_bytes(pool, plain);
                        *frame = FrameState::AwaitingLength;
                        *chunks += 1;
                    }
                }
            },
            DecoderState::Stream { decryptor, ota } => {
                for segment in pending.segments_mut() {
                    decryptor.apply(segment.as_mut_slice());
                }
                let Some(ota) = ota else {
                    if !pending.is_empty() {
                        output.merge(pending);
                        *chunks += 1;
                    }
                    return Ok(());
                };

                ota.unverified.merge(pending);
                loop {
                    match ota.frame {
                        FrameState::AwaitingLength => {
                            let mut len_bytes = [0u8; 2];
                            if ota.unverified.len() < len_bytes.len() {
                                return Ok(());
                            }
                            ota.unverified.drain_into(&mut len_bytes);
                            let payload_len = u16::from_be_bytes(len_bytes) as usize;
                            if payload_len > MAX_OTA_PAYLOAD_LEN {
                                return Err(CodecError::ChunkTooLarge(payload_len));
                            }
                            ota.frame = FrameState::AwaitingPayload(payload_len);
                        }
                        FrameState::AwaitingPayload(payload_len) => {
                            let body = &mut scratch[..OTA_TAG_LEN + payload_len];
                            if ota.unverified.len() < body.len() {
                                return Ok(());
                            }
                            ota.unverified.drain_into(body);
                            let (tag, payload) = body.split_at(OTA_TAG_LEN);
                            ota.auth.verify(payload, tag)?;
                            output.append_bytes(pool, payload);
                            ota.frame = FrameState::AwaitingLength;
                            *chunks += 1;
                        }
                    }
                }
            }
            DecoderState::Plain => {
                if !pending.is_empty() {
                    output.merge(pending);
                    *chunks += 1;
                }
                Ok(())
            }
            DecoderState::AwaitingSalt | DecoderState::Closed => Err(CodecError::SessionClosed),
        }
    }
}
