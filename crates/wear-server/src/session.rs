//! One accepted display session.
//!
//! The session task owns the socket for the lifetime of the link:
//! - sends the host's player snapshot right after accept,
//! - drains the outbound queue in FIFO order,
//! - sends a `PING` whenever nothing went out for one heartbeat interval,
//! - watches the read half so a peer close is noticed while idle.
//!
//! It returns on stop request, peer close, or the first failed write.
//! A message that cannot be encoded is logged and skipped.
//! Dropping the session closes the socket; the caller clears the queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};
use wear_core::{Message, MessageKind};
use wear_protocol::{encode_frame, FrameError, ProtocolError};

use crate::queue::OutboundQueue;
use crate::types::{raised, SessionEnd, SessionId, StatusProvider};

/// Writer half plus the bookkeeping updated on every successful send.
struct Wire {
    half: OwnedWriteHalf,
    last_sent: Instant,
    frames_sent: u64,
}

/// Serializes writes: one frame (write + flush) at a time.
struct SessionWriter {
    wire: Mutex<Wire>,
    max_frame_len: usize,
}

impl SessionWriter {
    fn new(half: OwnedWriteHalf, max_frame_len: usize) -> Self {
        SessionWriter {
            wire: Mutex::new(Wire {
                half,
                last_sent: Instant::now(),
                frames_sent: 0,
            }),
            max_frame_len,
        }
    }

    fn encode(&self, msg: &Message) -> Result<Bytes, ProtocolError> {
        encode_frame(msg, self.max_frame_len)
    }

    /// Write one pre-encoded frame and flush. Only I/O can fail here.
    async fn send_frame(&self, kind: MessageKind, frame: &[u8]) -> Result<(), FrameError> {
        let mut wire = self.wire.lock().await;
        wire.half.write_all(frame).await?;
        wire.half.flush().await?;
        wire.last_sent = Instant::now();
        wire.frames_sent += 1;
        trace!(%kind, bytes = frame.len(), "frame sent");
        Ok(())
    }

    async fn last_sent(&self) -> Instant {
        self.wire.lock().await.last_sent
    }

    async fn frames_sent(&self) -> u64 {
        self.wire.lock().await.frames_sent
    }
}

pub(crate) struct Session {
    id: SessionId,
    peer: SocketAddr,
    reader: OwnedReadHalf,
    writer: SessionWriter,
    queue: Arc<OutboundQueue>,
    status: Arc<dyn StatusProvider>,
    heartbeat: Duration,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        peer: SocketAddr,
        stream: TcpStream,
        queue: Arc<OutboundQueue>,
        status: Arc<dyn StatusProvider>,
        heartbeat: Duration,
        max_frame_len: usize,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Session {
            id,
            peer,
            reader,
            writer: SessionWriter::new(writer, max_frame_len),
            queue,
            status,
            heartbeat,
        }
    }

    /// Run until stopped or the link fails.
    ///
    /// `stop` flipping to `true` (or its sender going away) ends the
    /// session promptly, even in the middle of a blocked write.
    pub(crate) async fn run(
        mut self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<SessionEnd, FrameError> {
        let result = tokio::select! {
            biased;
            _ = raised(&mut stop) => Ok(SessionEnd::Stopped),
            res = self.pump() => res,
        };

        let frames_sent = self.writer.frames_sent().await;
        debug!(session = %self.id, peer = %self.peer, frames_sent, "session loop exited");
        result
    }

    async fn pump(&mut self) -> Result<SessionEnd, FrameError> {
        match self.status.current_player_status() {
            Some(snapshot) => self.deliver(&Message::PlayerStatus(snapshot)).await?,
            None => debug!(session = %self.id, "no player status to snapshot"),
        }

        let ping = self.writer.encode(&Message::Ping)?;
        let mut scratch = [0u8; 512];
        loop {
            if let Some(msg) = self.queue.pop() {
                self.deliver(&msg).await?;
                continue;
            }

            let deadline = self.writer.last_sent().await + self.heartbeat;

            tokio::select! {
                read = self.reader.read(&mut scratch) => match read {
                    Ok(0) => return Ok(SessionEnd::PeerClosed),
                    Ok(n) => trace!(session = %self.id, bytes = n, "discarding inbound bytes"),
                    Err(e) => return Err(e.into()),
                },
                _ = self.queue.notified() => {}
                _ = time::sleep_until(deadline) => {
                    self.writer.send_frame(MessageKind::Ping, &ping).await?;
                }
            }
        }
    }

    /// Send `msg`, or drop it with a warning if it cannot be encoded.
    ///
    /// A message that cannot be framed never reaches the socket, so the
    /// link and the rest of the queue stay usable.
    async fn deliver(&self, msg: &Message) -> Result<(), FrameError> {
        match self.writer.encode(msg) {
            Ok(frame) => self.writer.send_frame(msg.kind(), &frame).await,
            Err(e) => {
                warn!(session = %self.id, kind = %msg.kind(), error = %e, "dropping unsendable message");
                Ok(())
            }
        }
    }
}
