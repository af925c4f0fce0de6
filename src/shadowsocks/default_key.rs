use std::fmt;

use md5::{Digest, Md5};

use super::shadowsocks_key::ShadowsocksKey;
use crate::error::{CodecError, Result};

#[derive(Clone)]
pub struct DefaultKey {
    key_bytes: Box<[u8]>,
}

impl DefaultKey {
    pub fn new(password: &str, key_len: usize) -> Self {
        Self {
            key_bytes: get_key_bytes(password, key_len),
        }
    }
}

impl fmt::Debug for DefaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultKey")
            .field("key_len", &self.key_bytes.len())
            .finish_non_exhaustive()
    }
}

const SS_SUBKEY_INFO: &[&[u8]] = &[b"ss-subkey"];

struct SliceKeyType<'a>(&'a [u8]);

impl ring::hkdf::KeyType for SliceKeyType<'_> {
    fn len(&self) -> usize {
        self.0.len()
    }
}

impl ShadowsocksKey for DefaultKey {
    fn master_key(&self) -> &[u8] {
        &self.key_bytes
    }

    fn create_session_key(&self, salt: &[u8]) -> Result<Box<[u8]>> {
        let mut session_key = vec![0u8; self.key_bytes.len()];
        ring::hkdf::Salt::new(ring::hkdf::HKDF_SHA1_FOR_LEGACY_USE_ONLY, salt)
            .extract(&self.key_bytes)
            .expand(SS_SUBKEY_INFO, SliceKeyType(&self.key_bytes))
            .and_then(|okm| okm.fill(&mut session_key))
            .map_err(|_| CodecError::Crypto("session key derivation failed"))?;
        Ok(session_key.into_boxed_slice())
    }
}

fn get_key_bytes(password: &str, cipher_key_len: usize) -> Box<[u8]> {
    let password = password.as_bytes();
    let mut ret = vec![];
    let mut context = Md5::new();
    loop {
        context.update(password);
        let digest: [u8; 16] = context.finalize().into();
        ret.extend(digest.iter());
        if ret.len() >= cipher_key_len {
            break;
        }
        context = Md5::new();
        context.update(digest);
    }
    ret.truncate(cipher_key_len);
    ret.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_short_key_is_md5_of_password() {
        // md5("password")
        let key = DefaultKey::new("password", 16);
        assert_eq!(hex(key.master_key()), "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn test_long_key_chains_digests() {
        let short = DefaultKey::new("password", 16);
        let long = DefaultKey::new("password", 32);
        assert_eq!(long.master_key().len(), 32);
        assert_eq!(&long.master_key()[..16], short.master_key());

        let mut context = Md5::new();
        context.update(short.master_key());
        context.update(b"password");
        let second: [u8; 16] = context.finalize().into();
        assert_eq!(&long.master_key()[16..], &second);
    }

    #[test]
    fn test_zero_length_key() {
        let key = DefaultKey::new("password", 0);
        assert!(key.master_key().is_empty());
    }

    #[test]
    fn test_session_key_depends_on_salt() {
        let key = DefaultKey::new("secret", 32);
        let a = key.create_session_key(&[1u8; 32]).unwrap();
        let b = key.create_session_key(&[2u8; 32]).unwrap();
        let a_again = key.create_session_key(&[1u8; 32]).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }

    #[test]
    fn test_debug_hides_key() {
        let key = DefaultKey::new("secret", 16);
        let debug = format!("{key:?}");
        assert!(!debug.contains(&hex(key.master_key())));
    }
}
