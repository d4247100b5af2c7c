//! wear-server
//!
//! Game-side end of the wear link: accepts one display at a time and
//! streams queued status messages to it, with heartbeats while idle.

pub mod config;
pub mod queue;
pub mod server;
pub mod types;

// internal: only reachable through `WearServer`
mod session;

pub use config::{Config, ConfigError, OverflowPolicy};
pub use server::{ServerError, WearServer};
pub use types::{NoStatus, ServerState, SessionEnd, SessionId, StatusFn, StatusProvider};
