use std::sync::Arc;

use rand::RngCore;
use ring::aead::Aad;

use super::aead_util::{new_opening_key, new_sealing_key, TAG_LEN};
use super::default_key::DefaultKey;
use super::one_time_auth::{sign_packet, verify_packet, OTA_TAG_LEN};
use super::shadowsocks_cipher::ShadowsocksCipher;
use super::shadowsocks_key::ShadowsocksKey;
use super::stream_cipher::{StreamDecryptor, StreamEncryptor};
use crate::buf::{MultiBuffer, SegmentPool};
use crate::config::ShadowsocksConfig;
use crate::disguise::HeaderDisguise;
use crate::error::{CodecError, Result};

const MAX_PACKET_LEN: usize = 65535;

/// Encrypts and decrypts self-contained datagrams.
///
/// Every packet carries its own salt, so packets can be lost or reordered.
/// AEAD packets are `[salt][payload + tag]` sealed with nonce zero. Stream
/// cipher packets are `[iv][payload]` with a fresh keystream, plus a
/// trailing HMAC-SHA1 tag inside the keystream when one-time auth is on.
#[derive(Debug)]
pub struct ShadowsocksUdpHandler {
    cipher: ShadowsocksCipher,
    key: Arc<dyn ShadowsocksKey>,
    ota: bool,
    disguise: HeaderDisguise,
}

impl ShadowsocksUdpHandler {
    pub fn new(config: &ShadowsocksConfig) -> Result<Self> {
        config.validate()?;
        let key: Arc<dyn ShadowsocksKey> =
            Arc::new(DefaultKey::new(&config.password, config.cipher.key_len()));
        Ok(Self {
            cipher: config.cipher,
            key,
            ota: config.ota,
            disguise: config.disguise,
        })
    }

    pub fn cipher(&self) -> ShadowsocksCipher {
        self.cipher
    }

    fn tag_len(&self) -> usize {
        if self.cipher.is_aead() {
            TAG_LEN
        } else if self.ota {
            OTA_TAG_LEN
        } else {
            0
        }
    }

    /// Bytes a packet grows by, disguise header included.
    pub fn packet_overhead(&self) -> usize {
        self.disguise.overhead_size() + self.cipher.salt_len() + self.tag_len()
    }

    pub fn encrypt_packet(
        &self,
        pool: &SegmentPool,
        mut payload: MultiBuffer,
    ) -> Result<MultiBuffer> {
        let payload_len = payload.len();
        let packet_len = payload_len + self.packet_overhead();
        if packet_len > MAX_PACKET_LEN {
            return Err(CodecError::PacketTooLarge(packet_len));
        }

        let salt_len = self.cipher.salt_len();
        let mut packet = vec![0u8; salt_len + payload_len + self.tag_len()];
        let (salt, body) = packet.split_at_mut(salt_len);
        rand::rng().fill_bytes(salt);
        payload.drain_into(&mut body[..payload_len]);

        if let Some(algorithm) = self.cipher.aead_algorithm() {
            let session_key = self.key.create_session_key(salt)?;
            let mut sealing_key = new_sealing_key(algorithm, &session_key)?;
            let tag = sealing_key
                .seal_in_place_separate_tag(Aad::empty(), &mut body[..payload_len])
                .map_err(|_| CodecError::Crypto("seal failed"))?;
            body[payload_len..].copy_from_slice(tag.as_ref());
        } else if self.cipher.is_stream() {
            if self.ota {
                let tag = sign_packet(salt, self.key.master_key(), &body[..payload_len])?;
                body[payload_len..].copy_from_slice(&tag);
            }
            StreamEncryptor::new(self.cipher, self.key.master_key(), salt)?.apply(body);
        }

        Ok(self.disguise.frame(pool, MultiBuffer::from_bytes(pool, &packet)))
    }

    pub fn decrypt_packet(
        &self,
        pool: &SegmentPool,
        mut packet: MultiBuffer,
    ) -> Result<MultiBuffer> {
        self.disguise.strip(&mut packet)?;

        let salt_len = self.cipher.salt_len();
        let tag_len = self.tag_len();
        if packet.len() < salt_len + tag_len {
            return Err(CodecError::ShortRead);
        }

        let mut packet = packet.into_vec();
        let (salt, body) = packet.split_at_mut(salt_len);

        let plaintext: &[u8] = if let Some(algorithm) = self.cipher.aead_algorithm() {
            let session_key = self.key.create_session_key(salt)?;
            let mut opening_key = new_opening_key(algorithm, &session_key)?;
            &*opening_key
                .open_in_place(Aad::empty(), body)
                .map_err(|_| CodecError::AuthenticationFailed)?
        } else if self.cipher.is_stream() {
            StreamDecryptor::new(self.cipher, self.key.master_key(), salt)?.apply(body);
            let (payload, tag) = body.split_at(body.len() - tag_len);
            if self.ota {
                verify_packet(salt, self.key.master_key(), payload, tag)?;
            }
            payload
        } else {
            body
        };

        Ok(MultiBuffer::from_bytes(pool, plaintext))
    }
}
