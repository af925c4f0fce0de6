//! ssveil - the data plane of a shadowsocks-style encrypted tunnel.
//!
//! - [`buf`]: pooled fixed-size segments chained into multi-buffers, so
//!   payloads move between layers without copying.
//! - [`shadowsocks`]: the shadowsocks wire format. AEAD ciphers, legacy
//!   stream ciphers with optional one-time auth, and the plaintext mode,
//!   over connection streams or single datagrams.
//! - [`disguise`]: fixed-size decoy headers (SRTP, uTP, DTLS, ...) sent once
//!   before the encrypted stream.
//!
//! A connection is layered as `[disguise header][salt][frames]`:
//!
//! ```no_run
//! # async fn run(tcp: tokio::net::TcpStream) -> std::io::Result<()> {
//! use ssveil::buf::SegmentPool;
//! use ssveil::config::ShadowsocksConfig;
//! use tokio::io::AsyncWriteExt;
//!
//! let config = ShadowsocksConfig::from_fields("aes-256-gcm", "password")?;
//! let mut stream = config.wrap_stream(Box::new(tcp), SegmentPool::default())?;
//! stream.write_all(b"hello").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Servers that want replay protection build a
//! [`shadowsocks::ShadowsocksTcpHandler`] from the config instead, so every
//! accepted connection checks its salt against the same window.

pub mod async_stream;
pub mod buf;
pub mod config;
pub mod disguise;
pub mod error;
pub mod shadowsocks;

pub use error::{CodecError, Result};
