//! Plain records exchanged with the store.

use chrono::{DateTime, Utc};
use duel_protocol::RoomId;

/// A persisted room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
    /// Key into the game registry, e.g. `"tic-tac-toe"`.
    pub game_type: String,
    /// Display name of the connection that created the room. When that
    /// connection leaves the room, the room closes.
    pub host_display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A player seated in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub room_id: RoomId,
    pub display_name: String,
    /// Seat index, 0 or 1.
    pub order: i16,
    pub joined_at: DateTime<Utc>,
}

/// A live connection's registered display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub display_name: String,
    pub connected_at: DateTime<Utc>,
}
