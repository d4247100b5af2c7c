//! wear-protocol
//!
//! Wire-level encoding/decoding for the wear link.
//!
//! This crate is responsible for turning logical messages
//! (`wear_core::Message`) into bytes and back again.
//!
//! - [`json_codec`] : payload encoding (one JSON object per message)
//! - [`framing`]    : length prefix + async stream read/write
//! - [`wire_types`] : constants shared by both ends

pub mod wire_types;
pub mod json_codec;
pub mod framing;

pub use json_codec::{decode_message, encode_message, ProtocolError};

pub use framing::{encode_frame, read_frame, write_frame, FrameError};

pub use wire_types::{DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN};
