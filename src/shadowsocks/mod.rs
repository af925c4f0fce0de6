mod aead_util;
mod default_key;
mod one_time_auth;
mod salt_checker;
mod shadowsocks_cipher;
mod shadowsocks_decoder;
mod shadowsocks_encoder;
mod shadowsocks_key;
mod shadowsocks_session;
mod shadowsocks_stream;
mod shadowsocks_tcp_handler;
mod shadowsocks_udp_handler;
mod stream_cipher;

pub use aead_util::{MAX_AEAD_PAYLOAD_LEN, TAG_LEN};
pub use default_key::DefaultKey;
pub use one_time_auth::{MAX_OTA_PAYLOAD_LEN, OTA_TAG_LEN};
pub use salt_checker::{SaltChecker, TimedSaltChecker};
pub use shadowsocks_cipher::{ShadowsocksCipher, MAX_SALT_LEN};
pub use shadowsocks_decoder::ShadowsocksDecoder;
pub use shadowsocks_encoder::ShadowsocksEncoder;
pub use shadowsocks_key::ShadowsocksKey;
pub use shadowsocks_session::{SessionPhase, ShadowsocksSession};
pub use shadowsocks_stream::ShadowsocksStream;
pub use shadowsocks_tcp_handler::ShadowsocksTcpHandler;
pub use shadowsocks_udp_handler::ShadowsocksUdpHandler;
