use aes::{Aes128, Aes256};
use cfb_mode::cipher::{KeyIvInit, StreamCipher};
use cfb_mode::{BufDecryptor, BufEncryptor};
use chacha20::{ChaCha20, ChaCha20Legacy};

use super::shadowsocks_cipher::ShadowsocksCipher;
use crate::error::{CodecError, Result};

pub enum StreamEncryptor {
    Aes128Cfb(BufEncryptor<Aes128>),
    Aes256Cfb(BufEncryptor<Aes256>),
    Chacha20(ChaCha20Legacy),
    Chacha20Ietf(ChaCha20),
}

// CFB advances on ciphertext, so decryption keeps its own state.
pub enum StreamDecryptor {
    Aes128Cfb(BufDecryptor<Aes128>),
    Aes256Cfb(BufDecryptor<Aes256>),
    Chacha20(ChaCha20Legacy),
    Chacha20Ietf(ChaCha20),
}

fn init<C: KeyIvInit>(key: &[u8], iv: &[u8]) -> Result<C> {
    C::new_from_slices(key, iv)
        .map_err(|_| CodecError::Crypto("invalid stream cipher key or iv length"))
}

impl StreamEncryptor {
    pub fn new(cipher: ShadowsocksCipher, key: &[u8], iv: &[u8]) -> Result<Self> {
        let encryptor = match cipher {
            ShadowsocksCipher::Aes128Cfb => StreamEncryptor::Aes128Cfb(init(key, iv)?),
            ShadowsocksCipher::Aes256Cfb => StreamEncryptor::Aes256Cfb(init(key, iv)?),
            ShadowsocksCipher::Chacha20 => StreamEncryptor::Chacha20(init(key, iv)?),
            ShadowsocksCipher::Chacha20Ietf => StreamEncryptor::Chacha20Ietf(init(key, iv)?),
            _ => return Err(CodecError::Crypto("not a stream cipher")),
        };
        Ok(encryptor)
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        match self {
            StreamEncryptor::Aes128Cfb(c) => c.encrypt(data),
            StreamEncryptor::Aes256Cfb(c) => c.encrypt(data),
            StreamEncryptor::Chacha20(c) => c.apply_keystream(data),
            StreamEncryptor::Chacha20Ietf(c) => c.apply_keystream(data),
        }
    }
}

impl StreamDecryptor {
    pub fn new(cipher: ShadowsocksCipher, key: &[u8], iv: &[u8]) -> Result<Self> {
        let decryptor = match cipher {
            ShadowsocksCipher::Aes128Cfb => StreamDecryptor::Aes128Cfb(init(key, iv)?),
            ShadowsocksCipher::Aes256Cfb => StreamDecryptor::Aes256Cfb(init(key, iv)?),
            ShadowsocksCipher::Chacha20 => StreamDecryptor::Chacha20(init(key, iv)?),
            ShadowsocksCipher::Chacha20Ietf => StreamDecryptor::Chacha20Ietf(init(key, iv)?),
            _ => return Err(CodecError::Crypto("not a stream cipher")),
        };
        Ok(decryptor)
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        match self {
            StreamDecryptor::Aes128Cfb(c) => c.decrypt(data),
            StreamDecryptor::Aes256Cfb(c) => c.decrypt(data),
            StreamDecryptor::Chacha20(c) => c.apply_keystream(data),
            StreamDecryptor::Chacha20Ietf(c) => c.apply_keystream(data),
        }
    }
}
