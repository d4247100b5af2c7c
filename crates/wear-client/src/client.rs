// crates/wear-client/src/client.rs

use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tracing::{debug, error, info, trace, warn};
use wear_core::{Message, MessageKind, PlayerStatus, WorldStatus};
use wear_protocol::{read_frame, FrameError};

use crate::config::ClientConfig;
use crate::listeners::{ListenerId, ListenerRegistry};

/// Called with the server address when a connection opens or ends.
pub type ConnectionCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    #[error("connection to {addr} was stopped before it was established")]
    Cancelled { addr: SocketAddr },

    #[error("peer resolver task did not complete")]
    ResolverTask(#[source] JoinError),
}

/// Why a read loop ended.
#[derive(Debug)]
enum Disconnect {
    Stopped,
    Stale(Duration),
    Failed(FrameError),
}

struct ActiveConnection {
    peer: SocketAddr,
    stop: watch::Sender<bool>,
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct ReadSettings {
    stale_after: Option<Duration>,
    max_frame_len: usize,
}

/// Display-side client: at most one connection, fanned out to listeners.
pub struct WearClient {
    connect_timeout: Duration,
    settings: ReadSettings,
    listeners: Arc<ListenerRegistry>,
    active: Mutex<Option<ActiveConnection>>,
    // Bumped by every stop_connection, under the `active` lock.
    stop_requests: AtomicU64,
    // Serializes start_connection calls.
    starting: tokio::sync::Mutex<()>,
}

impl Default for WearClient {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl WearClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            settings: ReadSettings {
                stale_after: config.stale_after(),
                max_frame_len: config.max_frame_len,
            },
            listeners: Arc::new(ListenerRegistry::new()),
            active: Mutex::new(None),
            stop_requests: AtomicU64::new(0),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    /// Connect to `addr` and start reading.
    ///
    /// Any existing connection is stopped first and its `on_disconnected`
    /// has run by the time the new connect begins. On failure
    /// `on_disconnected(addr)` is invoked and the error is returned.
    ///
    /// A [`WearClient::stop_connection`] issued while the connect is still
    /// in flight wins: the fresh socket is closed and
    /// [`ClientError::Cancelled`] is returned.
    pub async fn start_connection<C, D>(
        &self,
        addr: SocketAddr,
        on_connected: C,
        on_disconnected: D,
    ) -> Result<(), ClientError>
    where
        C: Fn(SocketAddr) + Send + Sync + 'static,
        D: Fn(SocketAddr) + Send + Sync + 'static,
    {
        let _starting = self.starting.lock().await;
        self.stop_connection().await;
        let stops_seen = self.stop_requests.load(Ordering::Acquire);

        let on_connected: ConnectionCallback = Arc::new(on_connected);
        let on_disconnected: ConnectionCallback = Arc::new(on_disconnected);

        info!(%addr, "connecting to wear server");
        let stream = match time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                warn!(%addr, error = %source, "connect failed");
                notify(&on_disconnected, addr);
                return Err(ClientError::Connect { addr, source });
            }
            Err(_) => {
                warn!(%addr, timeout = ?self.connect_timeout, "connect timed out");
                notify(&on_disconnected, addr);
                return Err(ClientError::ConnectTimeout {
                    addr,
                    timeout: self.connect_timeout,
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "set_nodelay failed");
        }

        let mut active = self.lock_active();
        if self.stop_requests.load(Ordering::Acquire) != stops_seen {
            drop(active);
            drop(stream);
            info!(%addr, "stop requested while connecting, closing");
            notify(&on_disconnected, addr);
            return Err(ClientError::Cancelled { addr });
        }

        info!(%addr, "connected");
        let (stop, stop_rx) = watch::channel(false);
        let (ready, ready_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(read_loop(
            addr,
            stream,
            Arc::clone(&self.listeners),
            stop_rx,
            ready_rx,
            self.settings,
            Arc::clone(&alive),
            on_disconnected,
        ));

        *active = Some(ActiveConnection {
            peer: addr,
            stop,
            alive,
            task,
        });
        drop(active);

        // The read loop holds dispatch and `on_disconnected` until this ran.
        notify(&on_connected, addr);
        let _ = ready.send(());
        Ok(())
    }

    /// Close the current connection and wait for its read loop to finish.
    ///
    /// Safe to call repeatedly. With nothing connected it only cancels a
    /// `start_connection` that is still connecting.
    pub async fn stop_connection(&self) {
        let taken = {
            let mut active = self.lock_active();
            self.stop_requests.fetch_add(1, Ordering::AcqRel);
            active.take()
        };
        if let Some(conn) = taken {
            debug!(peer = %conn.peer, "stopping connection");
            conn.stop.send_replace(true);
            if let Err(e) = conn.task.await {
                error!(peer = %conn.peer, error = %e, "read loop task failed");
            }
        }
    }

    /// Register `callback` for messages of `kind`.
    ///
    /// Heartbeats are consumed by the read loop, so a `Ping` listener
    /// never fires.
    pub fn add_listener<F>(&self, kind: MessageKind, callback: F) -> ListenerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.listeners.add(kind, Arc::new(callback))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn on_player_status<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&PlayerStatus) + Send + Sync + 'static,
    {
        self.add_listener(MessageKind::PlayerStatus, move |msg| {
            if let Message::PlayerStatus(status) = msg {
                callback(status);
            }
        })
    }

    pub fn on_world_status<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&WorldStatus) + Send + Sync + 'static,
    {
        self.add_listener(MessageKind::WorldStatus, move |msg| {
            if let Message::WorldStatus(world) = msg {
                callback(world);
            }
        })
    }

    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.listeners.count(kind)
    }

    pub fn is_connected(&self) -> bool {
        self.lock_active()
            .as_ref()
            .map_or(false, |conn| conn.alive.load(Ordering::Acquire))
    }

    /// Address of the live connection, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.lock_active()
            .as_ref()
            .filter(|conn| conn.alive.load(Ordering::Acquire))
            .map(|conn| conn.peer)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn read_loop(
    peer: SocketAddr,
    mut stream: TcpStream,
    listeners: Arc<ListenerRegistry>,
    mut stop: watch::Receiver<bool>,
    ready: oneshot::Receiver<()>,
    settings: ReadSettings,
    alive: Arc<AtomicBool>,
    on_disconnected: ConnectionCallback,
) {
    let _ = ready.await;

    let reason = tokio::select! {
        biased;
        _ = stopped(&mut stop) => Disconnect::Stopped,
        reason = pump(&mut stream, &listeners, settings) => reason,
    };
    drop(stream);
    alive.store(false, Ordering::Release);

    match &reason {
        Disconnect::Stopped => info!(%peer, "connection stopped"),
        Disconnect::Stale(limit) => warn!(%peer, ?limit, "server went quiet, disconnecting"),
        Disconnect::Failed(e) if e.is_disconnect() => info!(%peer, "server closed the connection"),
        Disconnect::Failed(e) => warn!(%peer, error = %e, "connection failed"),
    }
    notify(&on_disconnected, peer);
}

async fn pump(
    stream: &mut TcpStream,
    listeners: &ListenerRegistry,
    settings: ReadSettings,
) -> Disconnect {
    loop {
        let next = match settings.stale_after {
            Some(limit) => match time::timeout(limit, read_frame(stream, settings.max_frame_len)).await
            {
                Ok(result) => result,
                Err(_) => return Disconnect::Stale(limit),
            },
            None => read_frame(stream, settings.max_frame_len).await,
        };

        match next {
            Ok(Message::Ping) => trace!("heartbeat"),
            Ok(msg) => {
                let ran = listeners.dispatch(&msg);
                trace!(kind = %msg.kind(), listeners = ran, "dispatched");
            }
            Err(e) => return Disconnect::Failed(e),
        }
    }
}

async fn stopped(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

fn notify(callback: &ConnectionCallback, addr: SocketAddr) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(addr))).is_err() {
        error!(%addr, "connection callback panicked");
    }
}
