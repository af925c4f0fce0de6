use std::fmt;

use ring::aead::{Algorithm, AES_128_GCM, AES_256_GCM, CHACHA20_POLY1305};
use serde::{Deserialize, Deserializer};

use super::aead_util::{AEAD_CHUNK_OVERHEAD, MAX_AEAD_PAYLOAD_LEN};
use super::one_time_auth::{MAX_OTA_PAYLOAD_LEN, OTA_HEADER_LEN};
use crate::error::{CodecError, Result};

pub const MAX_SALT_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowsocksCipher {
    Aes128Cfb,
    Aes256Cfb,
    Chacha20,
    Chacha20Ietf,
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
    None,
}

impl ShadowsocksCipher {
    pub const ALL: [ShadowsocksCipher; 8] = [
        ShadowsocksCipher::Aes128Cfb,
        ShadowsocksCipher::Aes256Cfb,
        ShadowsocksCipher::Chacha20,
        ShadowsocksCipher::Chacha20Ietf,
        ShadowsocksCipher::Aes128Gcm,
        ShadowsocksCipher::Aes256Gcm,
        ShadowsocksCipher::Chacha20Poly1305,
        ShadowsocksCipher::None,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ShadowsocksCipher::Aes128Cfb => "aes-128-cfb",
            ShadowsocksCipher::Aes256Cfb => "aes-256-cfb",
            ShadowsocksCipher::Chacha20 => "chacha20",
            ShadowsocksCipher::Chacha20Ietf => "chacha20-ietf",
            ShadowsocksCipher::Aes128Gcm => "aes-128-gcm",
            ShadowsocksCipher::Aes256Gcm => "aes-256-gcm",
            ShadowsocksCipher::Chacha20Poly1305 => "chacha20-poly1305",
            ShadowsocksCipher::None => "none",
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            ShadowsocksCipher::Aes128Cfb | ShadowsocksCipher::Aes128Gcm => 16,
            ShadowsocksCipher::Aes256Cfb
            | ShadowsocksCipher::Chacha20
            | ShadowsocksCipher::Chacha20Ietf
            | ShadowsocksCipher::Aes256Gcm
            | ShadowsocksCipher::Chacha20Poly1305 => 32,
            ShadowsocksCipher::None => 0,
        }
    }

    pub fn salt_len(&self) -> usize {
        match self {
            ShadowsocksCipher::Aes128Cfb
            | ShadowsocksCipher::Aes256Cfb
            | ShadowsocksCipher::Aes128Gcm => 16,
            ShadowsocksCipher::Chacha20 => 8,
            ShadowsocksCipher::Chacha20Ietf => 12,
            ShadowsocksCipher::Aes256Gcm | ShadowsocksCipher::Chacha20Poly1305 => 32,
            ShadowsocksCipher::None => 0,
        }
    }

    pub fn is_aead(&self) -> bool {
        self.aead_algorithm().is_some()
    }

    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            ShadowsocksCipher::Aes128Cfb
                | ShadowsocksCipher::Aes256Cfb
                | ShadowsocksCipher::Chacha20
                | ShadowsocksCipher::Chacha20Ietf
        )
    }

    pub fn supports_ota(&self) -> bool {
        self.is_stream()
    }

    pub(crate) fn aead_algorithm(&self) -> Option<&'static Algorithm> {
        match self {
            ShadowsocksCipher::Aes128Gcm => Some(&AES_128_GCM),
            ShadowsocksCipher::Aes256Gcm => Some(&AES_256_GCM),
            ShadowsocksCipher::Chacha20Poly1305 => Some(&CHACHA20_POLY1305),
            _ => None,
        }
    }

    pub fn overhead(&self, payload_len: usize, ota: bool) -> usize {
        if self.is_aead() {
            payload_len.div_ceil(MAX_AEAD_PAYLOAD_LEN) * AEAD_CHUNK_OVERHEAD
        } else if ota && self.supports_ota() {
            payload_len.div_ceil(MAX_OTA_PAYLOAD_LEN) * OTA_HEADER_LEN
        } else {
            0
        }
    }
}

impl TryFrom<&str> for ShadowsocksCipher {
    type Error = CodecError;

    fn try_from(name: &str) -> Result<Self> {
        let cipher = match name.to_ascii_lowercase().as_str() {
            "aes-128-cfb" => ShadowsocksCipher::Aes128Cfb,
            "aes-256-cfb" => ShadowsocksCipher::Aes256Cfb,
            "chacha20" => ShadowsocksCipher::Chacha20,
            "chacha20-ietf" => ShadowsocksCipher::Chacha20Ietf,
            "aes-128-gcm" => ShadowsocksCipher::Aes128Gcm,
            "aes-256-gcm" => ShadowsocksCipher::Aes256Gcm,
            "chacha20-poly1305" | "chacha20-ietf-poly1305" => ShadowsocksCipher::Chacha20Poly1305,
            "none" | "plain" => ShadowsocksCipher::None,
            _ => return Err(CodecError::InvalidCipherKind(name.to_string())),
        };
        Ok(cipher)
    }
}

impl std::str::FromStr for ShadowsocksCipher {
    type Err = CodecError;

    fn from_str(name: &str) -> Result<Self> {
        Self::try_from(name)
    }
}

impl fmt::Display for ShadowsocksCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ShadowsocksCipher {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        ShadowsocksCipher::try_from(name.as_str()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadowsocks::aead_util::TAG_LEN;

    #[test]
    fn test_lengths() {
        let expected = [
            ("aes-128-cfb", 16, 16),
            ("aes-256-cfb", 32, 16),
            ("chacha20", 32, 8),
            ("chacha20-ietf", 32, 12),
            ("aes-128-gcm", 16, 16),
            ("aes-256-gcm", 32, 32),
            ("chacha20-poly1305", 32, 32),
            ("none", 0, 0),
        ];
        for (name, key_len, salt_len) in expected {
            let cipher = ShadowsocksCipher::try_from(name).unwrap();
            assert_eq!(cipher.name(), name);
            assert_eq!(cipher.key_len(), key_len, "{name}");
            assert_eq!(cipher.salt_len(), salt_len, "{name}");
            assert!(cipher.salt_len() <= MAX_SALT_LEN);
        }
    }

    #[test]
    fn test_aead_key_len_matches_ring() {
        for cipher in ShadowsocksCipher::ALL {
            if let Some(algorithm) = cipher.aead_algorithm() {
                assert_eq!(algorithm.key_len(), cipher.key_len());
                assert_eq!(algorithm.tag_len(), TAG_LEN);
            }
        }
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(
            ShadowsocksCipher::try_from("AES-256-GCM").unwrap(),
            ShadowsocksCipher::Aes256Gcm
        );
        assert_eq!(
            "ChaCha20-IETF-Poly1305".parse::<ShadowsocksCipher>().unwrap(),
            ShadowsocksCipher::Chacha20Poly1305
        );
        assert_eq!(
            ShadowsocksCipher::try_from("plain").unwrap(),
            ShadowsocksCipher::None
        );
    }

    #[test]
    fn test_unknown_name() {
        match ShadowsocksCipher::try_from("rc4-md5") {
            Err(CodecError::InvalidCipherKind(name)) => assert_eq!(name, "rc4-md5"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_families() {
        assert!(ShadowsocksCipher::Aes128Gcm.is_aead());
        assert!(!ShadowsocksCipher::Aes128Gcm.supports_ota());
        assert!(ShadowsocksCipher::Chacha20.is_stream());
        assert!(ShadowsocksCipher::Chacha20.supports_ota());
        assert!(!ShadowsocksCipher::None.is_aead());
        assert!(!ShadowsocksCipher::None.supports_ota());
    }

    #[test]
    fn test_overhead() {
        let gcm = ShadowsocksCipher::Aes256Gcm;
        assert_eq!(gcm.overhead(0, false), 0);
        assert_eq!(gcm.overhead(1, false), 34);
        assert_eq!(gcm.overhead(0x3fff, false), 34);
        assert_eq!(gcm.overhead(0x4000, false), 68);

        let cfb = ShadowsocksCipher::Aes128Cfb;
        assert_eq!(cfb.overhead(100, false), 0);
        assert_eq!(cfb.overhead(100, true), 12);
        assert_eq!(ShadowsocksCipher::None.overhead(100, true), 0);
    }
}
