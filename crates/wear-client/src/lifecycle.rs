// crates/wear-client/src/lifecycle.rs

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::client::{ClientError, WearClient};
use crate::discovery::{resolve_until_cancelled, CancelFlag, PeerResolver, ResolveOutcome};

/// Drives resolve-then-connect for a [`WearClient`].
///
/// `start` and `stop` may be called in any order and any number of times;
/// the latest call wins.
pub struct ConnectionManager {
    client: Arc<WearClient>,
    resolver: Arc<dyn PeerResolver>,
    resolve_retry: Duration,
    cancel: Mutex<CancelFlag>,
    connected: Arc<watch::Sender<bool>>,
}

impl ConnectionManager {
    pub fn new(
        client: Arc<WearClient>,
        resolver: Arc<dyn PeerResolver>,
        resolve_retry: Duration,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            client,
            resolver,
            resolve_retry,
            cancel: Mutex::new(CancelFlag::new()),
            connected: Arc::new(connected),
        }
    }

    pub fn client(&self) -> &Arc<WearClient> {
        &self.client
    }

    /// Stop whatever is running, resolve the server and connect to it.
    pub async fn start(&self) -> Result<ResolveOutcome, ClientError> {
        self.stop().await;

        let flag = CancelFlag::new();
        *self.lock_cancel() = flag.clone();

        let resolver = Arc::clone(&self.resolver);
        let search = flag.clone();
        let retry = self.resolve_retry;
        let outcome = tokio::task::spawn_blocking(move || {
            resolve_until_cancelled(resolver.as_ref(), &search, retry)
        })
        .await
        .map_err(ClientError::ResolverTask)?;

        let addr = match outcome {
            ResolveOutcome::Resolved(addr) if !flag.is_cancelled() => addr,
            _ => {
                info!("connection start cancelled during resolution");
                return Ok(ResolveOutcome::Cancelled);
            }
        };

        let up = Arc::clone(&self.connected);
        let down = Arc::clone(&self.connected);
        let connected = self
            .client
            .start_connection(
                addr,
                move |_| {
                    up.send_replace(true);
                },
                move |_| {
                    down.send_replace(false);
                },
            )
            .await;
        match connected {
            Ok(()) => {}
            Err(ClientError::Cancelled { .. }) => {
                info!(%addr, "connection start cancelled while connecting");
                return Ok(ResolveOutcome::Cancelled);
            }
            Err(e) => return Err(e),
        }

        if flag.is_cancelled() {
            debug!(%addr, "stop raced with connect, closing");
            self.client.stop_connection().await;
            return Ok(ResolveOutcome::Cancelled);
        }
        Ok(ResolveOutcome::Resolved(addr))
    }

    /// Abort any pending resolution and close the connection.
    pub async fn stop(&self) {
        self.lock_cancel().cancel();
        self.client.stop_connection().await;
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancelFlag> {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner())
    }
}
