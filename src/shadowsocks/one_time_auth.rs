use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{CodecError, Result};

type HmacSha1 = Hmac<Sha1>;

pub const OTA_TAG_LEN: usize = 10;

pub const OTA_HEADER_LEN: usize = 2 + OTA_TAG_LEN;

pub const MAX_OTA_PAYLOAD_LEN: usize = 0x3fff;

// Chunk n is keyed by iv || n (big-endian u32).
pub struct ChunkAuthenticator {
    // iv followed by 4 bytes of chunk id
    mac_key: Box<[u8]>,
    chunk_id: u32,
}

impl ChunkAuthenticator {
    pub fn new(iv: &[u8]) -> Self {
        let mut mac_key = vec![0u8; iv.len() + 4];
        mac_key[..iv.len()].copy_from_slice(iv);
        Self {
            mac_key: mac_key.into_boxed_slice(),
            chunk_id: 0,
        }
    }

    fn next_mac(&mut self, payload: &[u8]) -> Result<HmacSha1> {
        let id_offset = self.mac_key.len() - 4;
        self.mac_key[id_offset..].copy_from_slice(&self.chunk_id.to_be_bytes());
        self.chunk_id = self.chunk_id.wrapping_add(1);

        let mut mac = HmacSha1::new_from_slice(&self.mac_key)
            .map_err(|_| CodecError::Crypto("invalid hmac key"))?;
        mac.update(payload);
        Ok(mac)
    }

    pub fn sign(&mut self, payload: &[u8], tag: &mut [u8; OTA_TAG_LEN]) -> Result<()> {
        let digest = self.next_mac(payload)?.finalize().into_bytes();
        tag.copy_from_slice(&digest[..OTA_TAG_LEN]);
        Ok(())
    }

    pub fn verify(&mut self, payload: &[u8], tag: &[u8]) -> Result<()> {
        self.next_mac(payload)?
            .verify_truncated_left(tag)
            .map_err(|_| CodecError::AuthenticationFailed)
    }
}

fn packet_mac(iv: &[u8], key: &[u8], payload: &[u8]) -> Result<HmacSha1> {
    let mut mac_key = Vec::with_capacity(iv.len() + key.len());
    mac_key.extend_from_slice(iv);
    mac_key.extend_from_slice(key);
    let mut mac =
        HmacSha1::new_from_slice(&mac_key).map_err(|_| CodecError::Crypto("invalid hmac key"))?;
    mac.update(payload);
    Ok(mac)
}

pub fn sign_packet(iv: &[u8], key: &[u8], payload: &[u8]) -> Result<[u8; OTA_TAG_LEN]> {
    let digest = packet_mac(iv, key, payload)?.finalize().into_bytes();
    let mut tag = [0u8; OTA_TAG_LEN];
    tag.copy_from_slice(&digest[..OTA_TAG_LEN]);
    Ok(tag)
}

pub fn verify_packet(iv: &[u8], key: &[u8], payload: &[u8], tag: &[u8]) -> Result<()> {
    packet_mac(iv, key, payload)?
        .verify_truncated_left(tag)
        .map_err(|_| CodecError::AuthenticationFailed)
}
