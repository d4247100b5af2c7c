//! Low-level wire constants.
//!
//! ```text
//! +---------------------+---------------------------+
//! | length (4 bytes)    | payload                   |
//! | u32 big-endian      | UTF-8 JSON, length bytes  |
//! +---------------------+---------------------------+
//! ```
//!
//! The length does **not** include the 4 prefix bytes themselves.

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a single payload.
///
/// Status messages are a few hundred bytes at most; anything close to
/// this limit is a broken or hostile peer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// A payload length is acceptable if it fits under `max`.
///
/// Zero is accepted here; readers treat an empty frame as a no-op.
pub fn validate_frame_len(len: usize, max: usize) -> bool {
    len <= max && len <= u32::MAX as usize
}
