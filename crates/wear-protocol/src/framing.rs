//! Length-prefixed framing for TCP streams.
//!
//! Every message on the wire is `[u32 BE length][JSON payload]`
//! (see [`crate::wire_types`]). A length of 0 is a valid no-op frame and
//! is skipped by readers.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wear_core::Message;

use crate::json_codec::{decode_message, encode_message, ProtocolError};
use crate::wire_types::{validate_frame_len, LENGTH_PREFIX_LEN};

/// Errors that can occur while moving frames over a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream, possibly in the middle of a frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A complete frame was received but is not a valid message.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

impl FrameError {
    /// True when the peer simply went away (as opposed to misbehaving).
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::ConnectionClosed => true,
            FrameError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            FrameError::Protocol(_) => false,
        }
    }
}

/// Encode `msg` into a complete frame (prefix + payload).
pub fn encode_frame(msg: &Message, max_frame_len: usize) -> Result<Bytes, ProtocolError> {
    let mut payload = Vec::with_capacity(128);
    encode_message(msg, &mut payload)?;

    if !validate_frame_len(payload.len(), max_frame_len) {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: max_frame_len,
        });
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(&payload);
    Ok(frame.freeze())
}

/// Read the next message from the stream.
///
/// Blocks until a full frame is available. Empty frames are skipped.
/// Returns [`FrameError::ConnectionClosed`] if the peer closes the stream
/// before a frame is complete.
pub async fn read_frame<R>(reader: &mut R, max_frame_len: usize) -> Result<Message, FrameError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
        reader.read_exact(&mut len_buf).await.map_err(eof_as_closed)?;

        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 {
            continue;
        }

        if !validate_frame_len(frame_len, max_frame_len) {
            return Err(ProtocolError::FrameTooLarge {
                len: frame_len,
                max: max_frame_len,
            }
            .into());
        }

        let mut payload = vec![0u8; frame_len];
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;

        return Ok(decode_message(&payload)?);
    }
}

/// Write one message as a frame and flush.
///
/// Returns the number of bytes put on the wire.
pub async fn write_frame<W>(
    writer: &mut W,
    msg: &Message,
    max_frame_len: usize,
) -> Result<usize, FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg, max_frame_len)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(frame.len())
}

fn eof_as_closed(e: io::Error) -> FrameError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}
