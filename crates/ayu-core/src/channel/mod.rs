//! Event dispatch channel: a single-producer, single-consumer transport for
//! [`Event`](crate::event::Event)s over TCP.
//!
//! # Architecture
//!
//! ```text
//! test run (producer)                         dashboard (consumer)
//!
//! Connection::connect ----- TCP ----->  Listener (accept loop, background)
//!     |                                      |
//!     send(event)                            serve_connection (one at a time)
//!       encode -> [u32 len][json body]         decode -> SharedRegistry::dispatch
//!                                                          -> handler(&event)
//! ```
//!
//! Frames are length-delimited (4-byte big-endian length, then the JSON
//! body). Bodies larger than [`ChannelConfig::max_frame_size`] are refused
//! on both sides.

pub mod connection;
pub mod listener;

use std::env;
use std::time::Duration;

use tokio_util::codec::LengthDelimitedCodec;

pub use connection::{probe, Connection};
pub use listener::{listen, Listener};

/// Environment variable overriding the host.
pub const HOST_ENV: &str = "AYU_HOST";
/// Environment variable overriding the port.
pub const PORT_ENV: &str = "AYU_PORT";

/// Endpoint and limits shared by both ends of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted frame body in bytes.
    pub max_frame_size: usize,
    /// Upper bound for `connect` and `probe`.
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    pub const DEFAULT_HOST: &str = "localhost";
    pub const DEFAULT_PORT: u16 = 1337;
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 30;
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::defaults()
        }
    }

    /// Build a config from the environment.
    ///
    /// An unset or empty `AYU_HOST` means `localhost`; an unset, empty, zero,
    /// or unparsable `AYU_PORT` means `1337`.
    pub fn from_env() -> Self {
        let mut config = Self::defaults();
        if let Some(host) = host_from_env() {
            config.host = host;
        }
        if let Some(port) = port_from_env() {
            config.port = port;
        }
        config
    }

    fn defaults() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_owned(),
            port: Self::DEFAULT_PORT,
            max_frame_size: Self::DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port`, as used in log lines and error messages.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Non-empty `AYU_HOST`, if set.
pub fn host_from_env() -> Option<String> {
    env::var(HOST_ENV).ok().filter(|h| !h.is_empty())
}

/// Non-zero `AYU_PORT`, if set and valid.
pub fn port_from_env() -> Option<u16> {
    let raw = env::var(PORT_ENV).ok().filter(|p| !p.is_empty())?;
    match raw.parse::<u16>() {
        Ok(0) => None,
        Ok(port) => Some(port),
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "ignoring invalid {PORT_ENV}");
            None
        }
    }
}

pub(crate) fn codec(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_size)
        .new_codec()
}
