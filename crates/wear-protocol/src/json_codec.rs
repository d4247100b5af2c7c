//! JSON encoding/decoding for wear messages.
//!
//! This module converts between:
//! - a raw payload (`&[u8]`, the bytes inside one frame)
//! - a high-level `wear_core::Message`
//!
//! Payload model (one message per buffer):
//!
//! ```text
//! {"kind":"PING"}
//! {"kind":"PLAYER_STATUS","health":f32,"healthDelta":f32,"maxHealth":f32,"foodLevel":i32}
//! {"kind":"WORLD_STATUS", <any other fields>}
//! ```
//!
//! NOTE: This module encodes/decodes **one message per buffer**. The length
//! prefix is added by [`crate::framing`].

use std::fmt;

use serde_json::Value;
use wear_core::{Message, MessageKind, KIND_FIELD};

/// Errors that can arise when encoding/decoding a payload.
///
/// Any of these on a complete frame is a protocol violation and ends
/// the session.
#[derive(Debug)]
pub enum ProtocolError {
    /// Decoding was asked to parse zero bytes.
    EmptyPayload,
    /// Payload is not valid UTF-8.
    InvalidUtf8,
    /// Payload is not a JSON object of the expected shape.
    Malformed(String),
    /// The object has no string `kind` field.
    MissingKind,
    /// `kind` names a message type this build does not know.
    UnknownKind(String),
    /// Payload length exceeds the configured limit.
    FrameTooLarge { len: usize, max: usize },
    /// A float field is NaN or infinite, which JSON cannot carry.
    NonFinite(&'static str),
    /// Serialization failed (should not happen for well-formed values).
    Encode(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::EmptyPayload => write!(f, "Empty payload"),
            ProtocolError::InvalidUtf8 => write!(f, "Payload is not valid UTF-8"),
            ProtocolError::Malformed(reason) => write!(f, "Malformed payload: {}", reason),
            ProtocolError::MissingKind => write!(f, "Payload has no `{}` field", KIND_FIELD),
            ProtocolError::UnknownKind(kind) => write!(f, "Unknown message kind: {}", kind),
            ProtocolError::FrameTooLarge { len, max } => {
                write!(f, "Frame of {} bytes exceeds maximum {}", len, max)
            }
            ProtocolError::NonFinite(field) => {
                write!(f, "Field `{}` is not a finite number", field)
            }
            ProtocolError::Encode(reason) => write!(f, "Encode error: {}", reason),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a single message as compact JSON.
///
/// The encoded bytes are appended to `out`. Nothing is appended when a
/// `PLAYER_STATUS` carries a NaN or infinite value.
pub fn encode_message(msg: &Message, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if let Message::PlayerStatus(status) = msg {
        if let Some(field) = status.non_finite_field() {
            return Err(ProtocolError::NonFinite(field));
        }
    }
    serde_json::to_writer(out, msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a single message from a payload buffer.
///
/// The buffer must contain exactly one JSON object.
pub fn decode_message(buf: &[u8]) -> Result<Message, ProtocolError> {
    if buf.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }

    let text = std::str::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    // Check the tag up front so an unknown kind is reported as such
    // rather than as a generic serde message.
    let tag = value
        .get(KIND_FIELD)
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?;
    if MessageKind::from_str(tag).is_none() {
        return Err(ProtocolError::UnknownKind(tag.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
