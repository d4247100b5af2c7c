//! wear-core
//!
//! Pure message model for the wear link:
//! - message kinds (wire tags)
//! - status payloads (player vitals, world state)
//! - the `Message` value sent over a session

pub mod kind;
pub mod messages;

pub use kind::MessageKind;

pub use messages::{Message, PlayerStatus, WorldStatus, KIND_FIELD};
