//! wear-client
//!
//! Display-side end of the wear link: connects to a wear server, turns the
//! frame stream into per-kind listener callbacks and reports connection
//! changes.

pub mod client;
pub mod config;
pub mod discovery;
pub mod lifecycle;
pub mod listeners;

pub use client::{ClientError, ConnectionCallback, WearClient};
pub use config::{ClientConfig, ConfigError};
pub use discovery::{CancelFlag, PeerResolver, ResolveOutcome, StaticResolver};
pub use lifecycle::ConnectionManager;
pub use listeners::{ListenerId, StatusCallback};
