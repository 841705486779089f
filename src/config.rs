//! Session configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::transport::ship_url;

/// Default node host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default state-history port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default capacity of each result stream.
///
/// A capacity of one hands each result over before the next frame is read.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Connection settings for a [`Session`](crate::Session).
///
/// Deserializes from a partial document; missing keys keep their defaults.
/// `read_timeout` is a human-readable duration such as `"30s"` or `"500ms"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of the error, status and blocks streams. Zero is treated as one.
    pub channel_capacity: usize,
    /// Deadline for each inbound frame. `None` waits forever.
    #[serde(default, with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// Largest inbound WebSocket message in bytes. `None` means no limit;
    /// deltas near the start of a chain can exceed the usual caps.
    pub max_message_size: Option<usize>,
    /// Largest inbound WebSocket frame in bytes. `None` means no limit.
    pub max_frame_size: Option<usize>,
}

impl SessionConfig {
    /// Configuration for `host:port` with every other setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// The `ws://` URL to dial.
    pub fn url(&self) -> String {
        ship_url(&self.host, self.port)
    }

    pub(crate) fn stream_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_timeout: None,
            max_message_size: None,
            max_frame_size: None,
        }
    }
}
