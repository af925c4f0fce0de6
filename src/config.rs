//! Configuration types.

use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::async_stream::AsyncStream;
use crate::buf::{SegmentPool, DEFAULT_MAX_IDLE_SEGMENTS};
use crate::disguise::HeaderDisguise;
use crate::error::{CodecError, Result};
use crate::shadowsocks::{ShadowsocksCipher, ShadowsocksSession, ShadowsocksStream};

#[derive(Debug, Clone)]
pub struct ShadowsocksConfig {
    pub cipher: ShadowsocksCipher,
    pub password: String,
    pub ota: bool,
    pub disguise: HeaderDisguise,
    /// Reject a salt seen again within this window. Only applied by
    /// `ShadowsocksTcpHandler::setup_server_stream`, which shares one checker
    /// across every connection of the endpoint.
    pub replay_window: Option<Duration>,
}

impl ShadowsocksConfig {
    pub fn from_fields(cipher: &str, password: &str) -> Result<Self> {
        Ok(Self {
            cipher: cipher.try_into()?,
            password: password.to_string(),
            ota: false,
            disguise: HeaderDisguise::None,
            replay_window: None,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.ota && !self.cipher.supports_ota() {
            return Err(CodecError::OtaNotSupported(self.cipher.name()));
        }
        Ok(())
    }

    pub fn open_session(&self) -> Result<ShadowsocksSession> {
        ShadowsocksSession::open(&self.password, self.cipher, self.ota)
    }

    /// Wraps `stream` with the configured disguise and cipher. No replay
    /// checking is done; servers use `ShadowsocksTcpHandler` for that.
    pub fn wrap_stream(
        &self,
        stream: Box<dyn AsyncStream>,
        pool: SegmentPool,
    ) -> Result<ShadowsocksStream> {
        if self.replay_window.is_some() {
            warn!("replay_window is only applied by ShadowsocksTcpHandler server streams");
        }
        let stream = self.disguise.wrap(stream);
        Ok(ShadowsocksStream::new(stream, self.open_session()?, pool))
    }
}

impl<'de> serde::de::Deserialize<'de> for ShadowsocksConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct ShadowsocksConfigTemp {
            cipher: ShadowsocksCipher,
            password: String,
            #[serde(default)]
            ota: bool,
            #[serde(default)]
            disguise: HeaderDisguise,
            #[serde(default)]
            replay_window_secs: Option<u64>,
        }

        let temp = ShadowsocksConfigTemp::deserialize(deserializer)?;
        let config = ShadowsocksConfig {
            cipher: temp.cipher,
            password: temp.password,
            ota: temp.ota,
            disguise: temp.disguise,
            replay_window: temp.replay_window_secs.map(Duration::from_secs),
        };
        config.validate().map_err(serde::de::Error::custom)?;
        Ok(config)
    }
}

fn default_max_idle_segments() -> usize {
    DEFAULT_MAX_IDLE_SEGMENTS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Free segments the pool keeps for reuse. Extra released segments are
    /// deallocated.
    #[serde(default = "default_max_idle_segments")]
    pub max_idle_segments: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_idle_segments: DEFAULT_MAX_IDLE_SEGMENTS,
        }
    }
}

impl BufferConfig {
    pub fn build_pool(&self) -> SegmentPool {
        SegmentPool::new(self.max_idle_segments)
    }
}
