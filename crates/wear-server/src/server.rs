//! TCP listener and session wiring.
//!
//! This module:
//! - Listens on the configured address/port (25500 by default).
//! - Accepts **one** display at a time and runs its session to completion.
//! - Tears the session down (socket closed, queue cleared) on every exit
//!   path, then goes back to accepting.
//!
//! The per-session send/heartbeat logic lives in `session`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, trace, warn};
use wear_core::Message;

use crate::config::Config;
use crate::queue::OutboundQueue;
use crate::session::Session;
use crate::types::{raised, NoStatus, ServerState, SessionId, StatusProvider};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Global-ish counter for assigning unique `SessionId`s.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Errors returned by [`WearServer::start`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be created (port in use, permissions).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Handle kept for the session currently running, so that other threads
/// can stop it.
struct ActiveSession {
    id: SessionId,
    peer: SocketAddr,
    stop: watch::Sender<bool>,
}

/// The game-side end of the wear link.
///
/// Construct one, share it behind an `Arc`, run [`WearServer::start`] on a
/// task, and call [`WearServer::enqueue`] from anywhere.
pub struct WearServer {
    config: Config,
    queue: Arc<OutboundQueue>,
    status: Arc<dyn StatusProvider>,
    active: Mutex<Option<ActiveSession>>,
    state: watch::Sender<ServerState>,
    shutdown: watch::Sender<bool>,
    sessions_completed: AtomicU64,
}

impl WearServer {
    /// Create a server with no snapshot provider.
    pub fn new(config: Config) -> Self {
        let queue = OutboundQueue::new(config.queue_capacity, config.overflow_policy);
        let (state, _) = watch::channel(ServerState::Idle);
        let (shutdown, _) = watch::channel(false);

        WearServer {
            config,
            queue: Arc::new(queue),
            status: Arc::new(NoStatus),
            active: Mutex::new(None),
            state,
            shutdown,
            sessions_completed: AtomicU64::new(0),
        }
    }

    /// Use `provider` for the snapshot sent right after each accept.
    pub fn with_status_provider(mut self, provider: Arc<dyn StatusProvider>) -> Self {
        self.status = provider;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured address and run the accept loop.
    ///
    /// Only returns an error if binding fails. Returns `Ok(())` after
    /// [`WearServer::shutdown`].
    pub async fn start(&self) -> Result<(), ServerError> {
        let addr = self.config.socket_addr_string();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(%addr, "wear server listening");

        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.state.send_replace(ServerState::Listening);
            debug!("waiting for wear display");

            let accepted = tokio::select! {
                biased;
                _ = raised(&mut shutdown) => break,
                res = listener.accept() => res,
            };

            match accepted {
                Ok((stream, peer)) => self.run_session(stream, peer, &mut shutdown).await,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }

        self.stop_session();
        self.state.send_replace(ServerState::Stopped);
        info!("wear server stopped");
        Ok(())
    }

    /// Queue a message for the connected display. Never blocks.
    ///
    /// Messages queued while no display is connected are sent to the next
    /// one, unless a session teardown clears them first.
    pub fn enqueue(&self, msg: impl Into<Message>) {
        let msg = msg.into();
        trace!(kind = %msg.kind(), "enqueue");
        self.queue.push(msg);
    }

    /// Close the active session (if any) and clear the queue.
    ///
    /// Idempotent and safe to call from any thread. The accept loop keeps
    /// running and will take the next display.
    pub fn stop_session(&self) {
        let active = self.lock_active().take();
        if let Some(session) = active {
            info!(session = %session.id, peer = %session.peer, "stopping wear session");
            session.stop.send_replace(true);
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            debug!(discarded, "outbound queue cleared");
        }
    }

    /// Stop the accept loop (and the active session).
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn is_session_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Number of sessions torn down so far.
    pub fn sessions_completed(&self) -> u64 {
        self.sessions_completed.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Messages discarded by a bounded queue's overflow policy.
    pub fn dropped_messages(&self) -> u64 {
        self.queue.dropped()
    }

    async fn run_session(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let id = next_session_id();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session = %id, error = %e, "could not set TCP_NODELAY");
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.lock_active() = Some(ActiveSession {
            id,
            peer,
            stop: stop_tx,
        });
        self.state.send_replace(ServerState::Connected { session: id, peer });
        info!(session = %id, %peer, "wear display connected");

        let session = Session::new(
            id,
            peer,
            stream,
            Arc::clone(&self.queue),
            Arc::clone(&self.status),
            self.config.heartbeat_interval,
            self.config.max_frame_len,
        );
        let mut task = tokio::spawn(session.run(stop_rx));

        let joined = tokio::select! {
            res = &mut task => res,
            _ = raised(shutdown) => {
                self.stop_session();
                task.await
            }
        };

        match joined {
            Ok(Ok(end)) => info!(session = %id, %peer, reason = ?end, "wear session ended"),
            Ok(Err(e)) if e.is_disconnect() => {
                info!(session = %id, %peer, error = %e, "wear display disconnected")
            }
            Ok(Err(e)) => warn!(session = %id, %peer, error = %e, "wear session failed"),
            Err(e) => error!(session = %id, %peer, error = %e, "wear session task aborted"),
        }

        self.finish_session(id);
    }

    /// Cleanup shared by every session exit path.
    fn finish_session(&self, id: SessionId) {
        {
            let mut active = self.lock_active();
            if active.as_ref().map(|a| a.id) == Some(id) {
                *active = None;
            }
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            debug!(session = %id, discarded, "discarded messages queued for a dead session");
        }
        self.sessions_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
