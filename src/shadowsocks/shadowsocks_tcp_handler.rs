use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use super::default_key::DefaultKey;
use super::salt_checker::{SaltChecker, TimedSaltChecker};
use super::shadowsocks_cipher::ShadowsocksCipher;
use super::shadowsocks_key::ShadowsocksKey;
use super::shadowsocks_session::ShadowsocksSession;
use super::shadowsocks_stream::ShadowsocksStream;
use crate::async_stream::AsyncStream;
use crate::buf::SegmentPool;
use crate::config::ShadowsocksConfig;
use crate::disguise::HeaderDisguise;
use crate::error::Result;

#[derive(Debug)]
pub struct ShadowsocksTcpHandler {
    cipher: ShadowsocksCipher,
    key: Arc<dyn ShadowsocksKey>,
    ota: bool,
    disguise: HeaderDisguise,
    salt_checker: Option<Arc<Mutex<dyn SaltChecker>>>,
    pool: SegmentPool,
}

impl ShadowsocksTcpHandler {
    pub fn new(config: &ShadowsocksConfig, pool: SegmentPool) -> Result<Self> {
        config.validate()?;
        let key: Arc<dyn ShadowsocksKey> =
            Arc::new(DefaultKey::new(&config.password, config.cipher.key_len()));
        let salt_checker = config.replay_window.map(|window| {
            let checker: Arc<Mutex<dyn SaltChecker>> =
                Arc::new(Mutex::new(TimedSaltChecker::new(window)));
            checker
        });
        Ok(Self {
            cipher: config.cipher,
            key,
            ota: config.ota,
            disguise: config.disguise,
            salt_checker,
            pool,
        })
    }

    pub fn cipher(&self) -> ShadowsocksCipher {
        self.cipher
    }

    pub fn setup_client_stream(&self, stream: Box<dyn AsyncStream>) -> Result<ShadowsocksStream> {
        let session = ShadowsocksSession::with_key(self.key.clone(), self.cipher, self.ota)?;
        Ok(self.create_stream(stream, session))
    }

    pub fn setup_server_stream(&self, stream: Box<dyn AsyncStream>) -> Result<ShadowsocksStream> {
        let mut session = ShadowsocksSession::with_key(self.key.clone(), self.cipher, self.ota)?;
        if let Some(salt_checker) = &self.salt_checker {
            session = session.with_salt_checker(salt_checker.clone());
        }
        Ok(self.create_stream(stream, session))
    }

    fn create_stream(
        &self,
        stream: Box<dyn AsyncStream>,
        session: ShadowsocksSession,
    ) -> ShadowsocksStream {
        debug!(
            "setting up {} stream with {} disguise",
            self.cipher,
            self.disguise.name()
        );
        ShadowsocksStream::new(self.disguise.wrap(stream), session, self.pool.clone())
    }
}
