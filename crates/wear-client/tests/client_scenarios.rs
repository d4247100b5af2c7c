// crates/wear-client/tests/client_scenarios.rs
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use wear_client::{
    CancelFlag, ClientConfig, ClientError, ConnectionManager, ResolveOutcome, StaticResolver,
    WearClient,
};
use wear_core::{Message, MessageKind, PlayerStatus, WorldStatus};
use wear_protocol::{write_frame, DEFAULT_MAX_FRAME_LEN};
use wear_server::{Config, ServerState, StatusFn, WearServer};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Connected(SocketAddr),
    Disconnected(SocketAddr),
    Player(String, PlayerStatus),
    World(WorldStatus),
}

/// Collects callbacks from any thread into a channel the test can await.
#[derive(Clone)]
struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl Recorder {
    fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn on_connected(&self) -> impl Fn(SocketAddr) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |addr| {
            let _ = tx.send(Event::Connected(addr));
        }
    }

    fn on_disconnected(&self) -> impl Fn(SocketAddr) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |addr| {
            let _ = tx.send(Event::Disconnected(addr));
        }
    }

    fn player(&self, tag: &'static str) -> impl Fn(&PlayerStatus) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |status| {
            let _ = tx.send(Event::Player(tag.to_string(), *status));
        }
    }

    fn world(&self) -> impl Fn(&WorldStatus) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |world| {
            let _ = tx.send(Event::World(world.clone()));
        }
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a client event")
        .expect("recorder dropped")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Event>, window: Duration) {
    if let Ok(Some(event)) = timeout(window, rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

fn client_config(stale_after_ms: u64) -> ClientConfig {
    ClientConfig {
        connect_timeout_ms: 2_000,
        stale_after_ms,
        ..ClientConfig::default()
    }
}

async fn start_server(heartbeat_ms: u64) -> (SocketAddr, Arc<WearServer>) {
    let config = Config {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        heartbeat_interval: Duration::from_millis(heartbeat_ms),
        ..Config::default()
    };
    let server = Arc::new(
        WearServer::new(config).with_status_provider(Arc::new(StatusFn(|| {
            Some(PlayerStatus::snapshot(20.0, 20.0, 18))
        }))),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let srv = Arc::clone(&server);
    tokio::spawn(async move { srv.run_with_listener(listener).await });

    let mut state = server.subscribe_state();
    timeout(WAIT, state.wait_for(|s| *s == ServerState::Listening))
        .await
        .unwrap()
        .unwrap();
    (addr, server)
}

/// A listener whose accept queue is full, so a new connect stalls in the
/// handshake until the queue is drained. Also returns the queued sockets.
async fn saturated_listener() -> (TcpListener, SocketAddr, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut queued = Vec::new();
    for _ in 0..16 {
        match timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => queued.push(stream),
            _ => break,
        }
    }
    assert!(queued.len() < 16, "accept queue never filled up");
    (listener, addr, queued)
}

fn patient_config() -> ClientConfig {
    ClientConfig {
        connect_timeout_ms: 10_000,
        ..client_config(0)
    }
}

fn snapshot() -> PlayerStatus {
    PlayerStatus {
        health: 20.0,
        health_delta: 0.0,
        max_health: 20.0,
        food_level: 18,
    }
}

#[tokio::test]
async fn snapshot_reaches_every_player_listener() {
    let (addr, _server) = start_server(50).await;
    let (rec, mut events) = Recorder::new();

    let client = WearClient::new(&client_config(0));
    client.on_player_status(rec.player("first"));
    client.on_player_status(rec.player("second"));

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await, Event::Connected(addr));
    assert_eq!(
        next_event(&mut events).await,
        Event::Player("first".into(), snapshot())
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Player("second".into(), snapshot())
    );

    // Heartbeats keep flowing but never surface as events.
    assert_quiet(&mut events, Duration::from_millis(200)).await;
    assert!(client.is_connected());
    assert_eq!(client.peer(), Some(addr));

    client.stop_connection().await;
    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
}

#[tokio::test]
async fn statuses_are_dispatched_by_kind_in_order() {
    let (addr, server) = start_server(1500).await;
    let (rec, mut events) = Recorder::new();

    let client = WearClient::new(&client_config(0));
    client.on_player_status(rec.player("p"));
    client.on_world_status(rec.world());

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));
    assert_eq!(next_event(&mut events).await, Event::Player("p".into(), snapshot()));

    let world = WorldStatus::new().with("time", 6000).with("weather", "rain");
    let hurt = PlayerStatus::new(17.5, -2.5, 20.0, 12);
    server.enqueue(world.clone());
    server.enqueue(hurt);

    assert_eq!(next_event(&mut events).await, Event::World(world));
    assert_eq!(next_event(&mut events).await, Event::Player("p".into(), hurt));
}

#[tokio::test]
async fn restart_fires_one_disconnect_before_reconnecting() {
    let (addr, server) = start_server(1500).await;
    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(0));

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));

    // The server serves one display at a time, so the second connect can
    // only be accepted once the first socket is really closed.
    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));

    let mut state = server.subscribe_state();
    timeout(WAIT, state.wait_for(|s| matches!(s, ServerState::Connected { .. })))
        .await
        .unwrap()
        .unwrap();
    assert_quiet(&mut events, Duration::from_millis(100)).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn stop_is_idempotent_and_client_can_reconnect() {
    let (addr, _server) = start_server(1500).await;
    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(0));

    client.stop_connection().await;

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));

    client.stop_connection().await;
    client.stop_connection().await;
    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
    assert_quiet(&mut events, Duration::from_millis(100)).await;
    assert!(!client.is_connected());

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));
}

#[tokio::test]
async fn server_closing_the_session_disconnects_the_client() {
    let (addr, server) = start_server(1500).await;
    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(0));

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));

    let mut state = server.subscribe_state();
    timeout(WAIT, state.wait_for(|s| matches!(s, ServerState::Connected { .. })))
        .await
        .unwrap()
        .unwrap();
    server.stop_session();

    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
    assert!(!client.is_connected());
    assert_eq!(client.peer(), None);
}

#[tokio::test]
async fn malformed_frame_ends_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        write_frame(
            &mut socket,
            &Message::player_status(10.0, 0.0, 20.0, 5),
            DEFAULT_MAX_FRAME_LEN,
        )
        .await
        .unwrap();
        let junk = b"{not json";
        socket.write_all(&(junk.len() as u32).to_be_bytes()).await.unwrap();
        socket.write_all(junk).await.unwrap();
        // Keep the socket open: the client must hang up on its own.
        tokio::time::sleep(WAIT).await;
    });

    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(0));
    client.on_player_status(rec.player("p"));
    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await, Event::Connected(addr));
    assert!(matches!(next_event(&mut events).await, Event::Player(_, s) if s.food_level == 5));
    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
    peer.abort();
}

#[tokio::test]
async fn silent_server_trips_the_staleness_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(WAIT).await;
    });

    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(150));
    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await, Event::Connected(addr));
    let started = tokio::time::Instant::now();
    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
    assert!(started.elapsed() < Duration::from_secs(2));
    peer.abort();
}

#[tokio::test]
async fn heartbeats_keep_a_quiet_link_alive() {
    let (addr, _server) = start_server(50).await;
    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(300));

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));

    // Only pings arrive, every 50 ms, well inside the 300 ms window.
    assert_quiet(&mut events, Duration::from_millis(800)).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn removed_listener_stops_receiving() {
    let (addr, server) = start_server(1500).await;
    let (rec, mut events) = Recorder::new();
    let client = WearClient::new(&client_config(0));

    let gone = client.on_player_status(rec.player("gone"));
    client.on_player_status(rec.player("kept"));
    assert!(client.remove_listener(gone));
    assert_eq!(client.listener_count(MessageKind::PlayerStatus), 1);

    client
        .start_connection(addr, rec.on_connected(), rec.on_disconnected())
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, Event::Connected(addr));
    assert_eq!(next_event(&mut events).await, Event::Player("kept".into(), snapshot()));

    server.enqueue(Message::player_status(19.0, -1.0, 20.0, 18));
    assert!(matches!(next_event(&mut events).await, Event::Player(tag, _) if tag == "kept"));
}

#[tokio::test]
async fn manager_resolves_and_tracks_connection() {
    let (addr, server) = start_server(1500).await;
    let client = Arc::new(WearClient::new(&client_config(0)));
    let manager = ConnectionManager::new(
        Arc::clone(&client),
        Arc::new(StaticResolver::new(addr)),
        Duration::from_millis(10),
    );
    let mut connected = manager.subscribe_connected();

    assert_eq!(manager.start().await.unwrap(), ResolveOutcome::Resolved(addr));
    timeout(WAIT, connected.wait_for(|up| *up)).await.unwrap().unwrap();
    assert!(manager.is_connected());

    server.stop_session();
    timeout(WAIT, connected.wait_for(|up| !*up)).await.unwrap().unwrap();
    assert!(!client.is_connected());

    // A second start reconnects.
    assert_eq!(manager.start().await.unwrap(), ResolveOutcome::Resolved(addr));
    timeout(WAIT, connected.wait_for(|up| *up)).await.unwrap().unwrap();

    manager.stop().await;
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn manager_retries_resolution_until_the_peer_appears() {
    let (addr, _server) = start_server(1500).await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let resolver = move |_: &CancelFlag| {
        if seen.fetch_add(1, Ordering::SeqCst) < 2 {
            None
        } else {
            Some(addr)
        }
    };

    let manager = ConnectionManager::new(
        Arc::new(WearClient::new(&client_config(0))),
        Arc::new(resolver),
        Duration::from_millis(10),
    );

    assert_eq!(manager.start().await.unwrap(), ResolveOutcome::Resolved(addr));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    manager.stop().await;
}

#[tokio::test]
async fn connect_failure_through_manager_is_reported() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let disconnects = Arc::new(Mutex::new(Vec::new()));

    let client = Arc::new(WearClient::new(&client_config(0)));
    let manager = ConnectionManager::new(
        Arc::clone(&client),
        Arc::new(StaticResolver::new(addr)),
        Duration::from_millis(10),
    );

    let log = Arc::clone(&disconnects);
    let err = client
        .start_connection(addr, |_| {}, move |a| log.lock().unwrap().push(a))
        .await
        .unwrap_err();
    assert!(err.to_string().contains(&addr.to_string()));
    assert_eq!(*disconnects.lock().unwrap(), vec![addr]);

    assert!(manager.start().await.is_err());
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn stop_during_connect_closes_the_new_socket() {
    let (listener, addr, queued) = saturated_listener().await;
    let (rec, mut events) = Recorder::new();
    let client = Arc::new(WearClient::new(&patient_config()));

    let starter = {
        let client = Arc::clone(&client);
        let (up, down) = (rec.on_connected(), rec.on_disconnected());
        tokio::spawn(async move { client.start_connection(addr, up, down).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!starter.is_finished(), "connect should still be in flight");
    client.stop_connection().await;

    // Make room in the accept queue so the stalled handshake completes.
    drop(queued);
    let acceptor = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let result = timeout(WAIT, starter).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled { addr: a }) if a == addr));
    assert_eq!(next_event(&mut events).await, Event::Disconnected(addr));
    assert_quiet(&mut events, Duration::from_millis(100)).await;
    assert!(!client.is_connected());
    assert_eq!(client.peer(), None);
    acceptor.abort();
}

#[tokio::test]
async fn manager_stop_during_connect_tears_the_connection_down() {
    let (listener, addr, queued) = saturated_listener().await;
    let client = Arc::new(WearClient::new(&patient_config()));
    let manager = Arc::new(ConnectionManager::new(
        Arc::clone(&client),
        Arc::new(StaticResolver::new(addr)),
        Duration::from_millis(10),
    ));

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start().await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!starter.is_finished(), "connect should still be in flight");
    manager.stop().await;

    // The server drains the queue: every queued socket and the stalled
    // connect each become one session.
    let expected = queued.len() as u64 + 1;
    drop(queued);
    let server = Arc::new(WearServer::new(Config {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }));
    let srv = Arc::clone(&server);
    tokio::spawn(async move { srv.run_with_listener(listener).await });

    let outcome = timeout(WAIT, starter).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome, ResolveOutcome::Cancelled);
    assert!(!client.is_connected());
    assert!(!manager.is_connected());

    let deadline = tokio::time::Instant::now() + WAIT;
    while server.sessions_completed() < expected {
        assert!(tokio::time::Instant::now() < deadline, "sessions never ended");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.sessions_completed(), expected);
    assert!(!server.is_session_active());
}
