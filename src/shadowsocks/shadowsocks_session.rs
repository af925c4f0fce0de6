use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use super::default_key::DefaultKey;
use super::salt_checker::SaltChecker;
use super::shadowsocks_cipher::ShadowsocksCipher;
use super::shadowsocks_decoder::ShadowsocksDecoder;
use super::shadowsocks_encoder::ShadowsocksEncoder;
use super::shadowsocks_key::ShadowsocksKey;
use crate::buf::{MultiBuffer, SegmentPool};
use crate::error::{CodecError, Result};

/// Where one direction of a session is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    SaltExchanged,
    Streaming,
    Closed,
}

/// An encoder and decoder sharing one master key.
///
/// Each direction has its own salt and its own nonce counter. A failure in
/// either direction closes both.
pub struct ShadowsocksSession {
    encoder: ShadowsocksEncoder,
    decoder: ShadowsocksDecoder,
}

impl ShadowsocksSession {
    pub fn open(password: &str, cipher: ShadowsocksCipher, ota: bool) -> Result<Self> {
        let key: Arc<dyn ShadowsocksKey> = Arc::new(DefaultKey::new(password, cipher.key_len()));
        Self::with_key(key, cipher, ota)
    }

    pub fn open_by_name(password: &str, cipher_name: &str, ota: bool) -> Result<Self> {
        Self::open(password, ShadowsocksCipher::try_from(cipher_name)?, ota)
    }

    pub fn with_key(
        key: Arc<dyn ShadowsocksKey>,
        cipher: ShadowsocksCipher,
        ota: bool,
    ) -> Result<Self> {
        if ota && !cipher.supports_ota() {
            return Err(CodecError::OtaNotSupported(cipher.name()));
        }
        debug!("opening {} session (ota: {})", cipher, ota);
        Ok(Self {
            encoder: ShadowsocksEncoder::new(cipher, key.clone(), ota),
            decoder: ShadowsocksDecoder::new(cipher, key, ota),
        })
    }

    pub fn with_salt_checker(mut self, salt_checker: Arc<Mutex<dyn SaltChecker>>) -> Self {
        self.decoder.set_salt_checker(salt_checker);
        self
    }

    pub fn cipher(&self) -> ShadowsocksCipher {
        self.encoder.cipher()
    }

    pub fn encoder_phase(&self) -> SessionPhase {
        self.encoder.phase()
    }

    pub fn decoder_phase(&self) -> SessionPhase {
        self.decoder.phase()
    }

    pub fn encrypt(&mut self, pool: &SegmentPool, plaintext: MultiBuffer) -> Result<MultiBuffer> {
        let result = self.encoder.encrypt(pool, plaintext);
        if result.is_err() {
            self.close();
        }
        result
    }

    pub fn decrypt(&mut self, pool: &SegmentPool, ciphertext: MultiBuffer) -> Result<MultiBuffer> {
        let result = self.decoder.decrypt(pool, ciphertext);
        if result.is_err() {
            self.close();
        }
        result
    }

    pub fn finish(&mut self) -> Result<()> {
        let result = self.decoder.finish();
        if result.is_err() {
            self.close();
        }
        result
    }

    pub fn close(&mut self) {
        self.encoder.close();
        self.decoder.close();
    }

    pub fn into_parts(self) -> (ShadowsocksEncoder, ShadowsocksDecoder) {
        (self.encoder, self.decoder)
    }
}
