//! Configuration for the wear session server.
//!
//! You can either use defaults or override via environment variables:
//!
//! - `WEAR_BIND_ADDR`       (default: "0.0.0.0")
//! - `WEAR_PORT`            (default: "25500")
//! - `WEAR_HEARTBEAT_MS`    (default: "1500")
//! - `WEAR_MAX_FRAME_LEN`   (default: "65536")
//! - `WEAR_QUEUE_CAPACITY`  (default: "0", unbounded)
//! - `WEAR_OVERFLOW_POLICY` (default: "drop-oldest"; or "drop-newest")

use std::env;
use std::str::FromStr;
use std::time::Duration;

use wear_protocol::DEFAULT_MAX_FRAME_LEN;

/// Port the display expects the game to listen on.
pub const DEFAULT_PORT: u16 = 25500;

/// Outbound idleness after which a `PING` is sent.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(1500);

/// Errors while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// What `enqueue` does when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest queued message to make room.
    DropOldest,
    /// Discard the message being enqueued.
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown overflow policy `{}`", other)),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Outbound idleness that triggers a heartbeat.
    pub heartbeat_interval: Duration,

    /// Largest payload accepted or produced.
    pub max_frame_len: usize,

    /// Outbound queue capacity; `None` means unbounded.
    pub queue_capacity: Option<usize>,

    /// Applied when a bounded queue is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            heartbeat_interval: DEFAULT_HEARTBEAT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            queue_capacity: None,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_addr = lookup("WEAR_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_or_default(&lookup, "WEAR_PORT", defaults.port)?;
        let heartbeat_ms = read_or_default(
            &lookup,
            "WEAR_HEARTBEAT_MS",
            defaults.heartbeat_interval.as_millis() as u64,
        )?;
        let max_frame_len = read_or_default(&lookup, "WEAR_MAX_FRAME_LEN", defaults.max_frame_len)?;
        let capacity = read_or_default(&lookup, "WEAR_QUEUE_CAPACITY", 0usize)?;
        let overflow_policy =
            read_or_default(&lookup, "WEAR_OVERFLOW_POLICY", defaults.overflow_policy)?;

        if heartbeat_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "WEAR_HEARTBEAT_MS",
                value: heartbeat_ms.to_string(),
                reason: "heartbeat interval must be positive".to_string(),
            });
        }

        Ok(Config {
            bind_addr,
            port,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            max_frame_len,
            queue_capacity: (capacity > 0).then_some(capacity),
            overflow_policy,
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_or_default<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: val.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
