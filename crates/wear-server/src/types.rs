//! Shared types for the wear session server.
//!
//! This module defines:
//! - `SessionId`: a lightweight handle for an accepted peer session
//! - `ServerState`: what the accept loop is currently doing
//! - `StatusProvider`: the host application's snapshot hook
//! - `SessionEnd`: why a session finished

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::watch;
use wear_core::PlayerStatus;

/// Identifier for an accepted session.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable state of the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not yet listening.
    Idle,
    /// Waiting for a display to connect.
    Listening,
    /// A session is running.
    Connected { session: SessionId, peer: SocketAddr },
    /// The accept loop has exited.
    Stopped,
}

/// Source of the snapshot sent right after a display connects.
///
/// Returning `None` (e.g. no player loaded yet) is not an error; the
/// session simply starts without a snapshot.
pub trait StatusProvider: Send + Sync {
    fn current_player_status(&self) -> Option<PlayerStatus>;
}

/// Adapts a closure into a [`StatusProvider`].
pub struct StatusFn<F>(pub F);

impl<F> StatusProvider for StatusFn<F>
where
    F: Fn() -> Option<PlayerStatus> + Send + Sync,
{
    fn current_player_status(&self) -> Option<PlayerStatus> {
        (self.0)()
    }
}

/// A provider that never has a snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatus;

impl StatusProvider for NoStatus {
    fn current_player_status(&self) -> Option<PlayerStatus> {
        None
    }
}

/// How a session ended without an I/O or protocol failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `stop_session` or server shutdown.
    Stopped,
    /// The peer closed its side.
    PeerClosed,
}

/// Resolves once `flag` reads `true` or its sender is gone.
pub(crate) async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}
