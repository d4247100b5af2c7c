//! Message kind (the `kind` tag carried by every frame).

use std::fmt;

/// Canonical wire tag for a heartbeat.
pub const PING_TAG: &str = "PING";
/// Canonical wire tag for a player vitals update.
pub const PLAYER_STATUS_TAG: &str = "PLAYER_STATUS";
/// Canonical wire tag for a world state update.
pub const WORLD_STATUS_TAG: &str = "WORLD_STATUS";

/// The closed set of message kinds understood by both ends of the link.
///
/// Listeners on the display side are registered per kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    PlayerStatus,
    WorldStatus,
}

impl MessageKind {
    /// All kinds, in wire-tag order.
    pub const ALL: [MessageKind; 3] = [
        MessageKind::Ping,
        MessageKind::PlayerStatus,
        MessageKind::WorldStatus,
    ];

    /// The tag string used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Ping => PING_TAG,
            MessageKind::PlayerStatus => PLAYER_STATUS_TAG,
            MessageKind::WorldStatus => WORLD_STATUS_TAG,
        }
    }

    /// Try to parse a wire tag (case-sensitive).
    pub fn from_str(tag: &str) -> Option<Self> {
        match tag {
            PING_TAG => Some(MessageKind::Ping),
            PLAYER_STATUS_TAG => Some(MessageKind::PlayerStatus),
            WORLD_STATUS_TAG => Some(MessageKind::WorldStatus),
            _ => None,
        }
    }

    /// Heartbeats carry no status and are never dispatched to listeners.
    pub fn is_heartbeat(self) -> bool {
        matches!(self, MessageKind::Ping)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
