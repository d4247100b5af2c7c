//! Message types exchanged over the wear link.
//!
//! These are **transport-agnostic** logical messages. The JSON shape is
//! fixed here through serde attributes so both ends agree on it:
//!
//! ```text
//! {"kind":"PING"}
//! {"kind":"PLAYER_STATUS","health":20.0,"healthDelta":0.0,"maxHealth":20.0,"foodLevel":18}
//! {"kind":"WORLD_STATUS", ...producer defined fields...}
//! ```
//!
//! Note: framing and the actual JSON encoder live in the `wear-protocol`
//! crate; this module is purely logical.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kind::MessageKind;

/// Name of the tag field. Producers cannot use it inside `WORLD_STATUS`.
pub const KIND_FIELD: &str = "kind";

/// One unit of information sent from the game to the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message {
    /// Heartbeat; proves the link is alive and carries nothing else.
    #[serde(rename = "PING")]
    Ping,

    /// Player vitals.
    #[serde(rename = "PLAYER_STATUS")]
    PlayerStatus(PlayerStatus),

    /// World level state, shape owned by the producer.
    #[serde(rename = "WORLD_STATUS")]
    WorldStatus(WorldStatus),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping => MessageKind::Ping,
            Message::PlayerStatus(_) => MessageKind::PlayerStatus,
            Message::WorldStatus(_) => MessageKind::WorldStatus,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind().is_heartbeat()
    }

    /// Convenience constructor for a player vitals update.
    pub fn player_status(health: f32, health_delta: f32, max_health: f32, food_level: i32) -> Self {
        Message::PlayerStatus(PlayerStatus::new(
            health,
            health_delta,
            max_health,
            food_level,
        ))
    }
}

impl From<PlayerStatus> for Message {
    fn from(status: PlayerStatus) -> Self {
        Message::PlayerStatus(status)
    }
}

impl From<WorldStatus> for Message {
    fn from(status: WorldStatus) -> Self {
        Message::WorldStatus(status)
    }
}

/// Player vitals (`PLAYER_STATUS`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    /// Current health points.
    pub health: f32,

    /// Change in health since the previous update (negative = damage).
    pub health_delta: f32,

    /// Maximum health points.
    pub max_health: f32,

    /// Food / hunger level.
    pub food_level: i32,
}

impl PlayerStatus {
    pub fn new(health: f32, health_delta: f32, max_health: f32, food_level: i32) -> Self {
        PlayerStatus {
            health,
            health_delta,
            max_health,
            food_level,
        }
    }

    /// A standalone snapshot with no known previous health (`health_delta = 0`).
    ///
    /// This is what the game sends right after a display connects.
    pub fn snapshot(health: f32, max_health: f32, food_level: i32) -> Self {
        PlayerStatus::new(health, 0.0, max_health, food_level)
    }

    /// Build the next update, deriving `health_delta` from `previous`.
    pub fn following(
        previous: Option<&PlayerStatus>,
        health: f32,
        max_health: f32,
        food_level: i32,
    ) -> Self {
        let health_delta = previous.map_or(0.0, |prev| health - prev.health);
        PlayerStatus::new(health, health_delta, max_health, food_level)
    }

    /// Wire name of the first NaN or infinite field, if any.
    ///
    /// JSON has no representation for these values.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("health", self.health),
            ("healthDelta", self.health_delta),
            ("maxHealth", self.max_health),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| name)
    }
}

/// World state (`WORLD_STATUS`).
///
/// The connector does not interpret these fields; the game decides what
/// goes in (time of day, weather, dimension, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldStatus {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl WorldStatus {
    pub fn new() -> Self {
        WorldStatus::default()
    }

    /// Builder-style insert. A `kind` key is ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field, returning `false` if the key is reserved.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if key == KIND_FIELD {
            return false;
        }
        self.fields.insert(key, value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
