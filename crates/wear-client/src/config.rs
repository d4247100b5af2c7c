// crates/wear-client/src/config.rs

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wear_protocol::DEFAULT_MAX_FRAME_LEN;

/// Port assumed when `server_addr` only names a host.
pub const DEFAULT_SERVER_PORT: u16 = 25500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid server address {0:?}")]
    InvalidAddr(String),
}

/// Configuration for the display client.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `ip` or `ip:port` of the game. Unset means "ask the resolver".
    pub server_addr: Option<String>,

    /// Give up on a TCP connect after this long.
    pub connect_timeout_ms: u64,

    /// Disconnect when nothing at all arrives for this long; `0` disables.
    /// Defaults to three missed heartbeats.
    pub stale_after_ms: u64,

    /// Largest frame accepted from the server.
    pub max_frame_len: usize,

    /// Pause between unsuccessful resolution attempts.
    pub resolve_retry_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: None,
            connect_timeout_ms: 5_000,
            stale_after_ms: 4_500,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            resolve_retry_ms: 500,
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_after_ms > 0).then(|| Duration::from_millis(self.stale_after_ms))
    }

    pub fn resolve_retry(&self) -> Duration {
        Duration::from_millis(self.resolve_retry_ms)
    }

    /// The configured server address, if any.
    pub fn peer_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.server_addr.as_deref().map(parse_peer_addr).transpose()
    }
}

/// Parse `ip:port`, or a bare `ip` with the default port.
pub fn parse_peer_addr(text: &str) -> Result<SocketAddr, ConfigError> {
    let text = text.trim();
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    text.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_SERVER_PORT))
        .map_err(|_| ConfigError::InvalidAddr(text.to_string()))
}
