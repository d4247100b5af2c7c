// crates/wear-client/src/discovery.rs

//! Locating the game's address from the display side.
//!
//! Resolution is blocking and may take arbitrarily long (e.g. waiting for a
//! broadcast), so it runs on the blocking pool and is interrupted through a
//! [`CancelFlag`].

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// One-shot cancellation signal shared between the lifecycle and a resolver.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep for up to `timeout`, returning early if cancelled.
    ///
    /// Returns `true` when the flag is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = lock.lock().unwrap_or_else(|p| p.into_inner());
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = match cvar.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(p) => p.into_inner().0,
            };
        }
        *cancelled
    }
}

/// Finds the address of a running wear server.
///
/// Implementations may block; they should check `cancel` (or wait on it)
/// and return `None` promptly once it is raised.
pub trait PeerResolver: Send + Sync {
    fn resolve_peer_address(&self, cancel: &CancelFlag) -> Option<SocketAddr>;
}

impl<F> PeerResolver for F
where
    F: Fn(&CancelFlag) -> Option<SocketAddr> + Send + Sync,
{
    fn resolve_peer_address(&self, cancel: &CancelFlag) -> Option<SocketAddr> {
        self(cancel)
    }
}

/// Always resolves to the same address.
#[derive(Debug, Clone, Copy)]
pub struct StaticResolver(SocketAddr);

impl StaticResolver {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl PeerResolver for StaticResolver {
    fn resolve_peer_address(&self, _cancel: &CancelFlag) -> Option<SocketAddr> {
        Some(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(SocketAddr),
    Cancelled,
}

/// Ask `resolver` until it answers or `cancel` is raised, pausing `retry`
/// between empty answers.
pub fn resolve_until_cancelled(
    resolver: &dyn PeerResolver,
    cancel: &CancelFlag,
    retry: Duration,
) -> ResolveOutcome {
    let mut attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            debug!(attempts, "resolution cancelled");
            return ResolveOutcome::Cancelled;
        }
        attempts += 1;

        if let Some(addr) = resolver.resolve_peer_address(cancel) {
            if cancel.is_cancelled() {
                debug!(%addr, "resolved after cancel, discarding");
                return ResolveOutcome::Cancelled;
            }
            debug!(%addr, attempts, "peer resolved");
            return ResolveOutcome::Resolved(addr);
        }

        trace!(attempts, "peer not found yet");
        if cancel.wait_timeout(retry) {
            debug!(attempts, "resolution cancelled");
            return ResolveOutcome::Cancelled;
        }
    }
}
