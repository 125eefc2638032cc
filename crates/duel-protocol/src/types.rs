//! Core protocol types for Duel's wire format.
//!
//! Every frame in either direction is a JSON envelope:
//!
//! ```text
//! { "type": "<message type>", "payload": <type-specific JSON> }
//! ```
//!
//! Inbound frames are decoded in two steps: first into the loose
//! [`Envelope`], then into a typed [`ClientMessage`]. Splitting the steps
//! lets the server tell "not JSON at all", "unknown type" and "right type,
//! wrong payload" apart, and answer each with its own error text.
//! Outbound frames are the typed [`ServerMessage`] enum, serialized with
//! serde's adjacent tagging so the envelope shape falls out of the derive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a room. Matches the id of the persisted room record.
///
/// Serialized as the bare hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Generates a fresh random room id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RoomId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ProtocolError::InvalidRoomId)
    }
}

/// Opaque identifier of one live connection.
///
/// Never sent to clients; they only ever see display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random connection id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A connection's standing within a room.
///
/// The two seats are filled in arrival order; everyone after that watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// First seat. Moves first in a fresh game.
    #[serde(rename = "player_0")]
    Player0,
    /// Second seat.
    #[serde(rename = "player_1")]
    Player1,
    /// Watches the game, cannot move.
    #[serde(rename = "spectator")]
    Spectator,
}

impl Role {
    /// The role for a seat index, or `None` for an index past the seats.
    pub fn for_seat(seat: usize) -> Option<Self> {
        match seat {
            0 => Some(Self::Player0),
            1 => Some(Self::Player1),
            _ => None,
        }
    }

    /// The seat index this role plays from, `None` for spectators.
    pub fn seat(self) -> Option<usize> {
        match self {
            Self::Player0 => Some(0),
            Self::Player1 => Some(1),
            Self::Spectator => None,
        }
    }

    /// The other seat. Spectators stay spectators.
    pub fn swapped(self) -> Self {
        match self {
            Self::Player0 => Self::Player1,
            Self::Player1 => Self::Player0,
            Self::Spectator => Self::Spectator,
        }
    }

    /// `true` for either player seat.
    pub fn is_player(self) -> bool {
        self.seat().is_some()
    }

    /// The wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player0 => "player_0",
            Self::Player1 => "player_1",
            Self::Spectator => "spectator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// The loosely typed envelope every inbound frame is first decoded into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type, e.g. `"join_room"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload. Absent and `null` both decode to `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// A typed message from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Join (activating if needed) the room with this id.
    JoinRoom { room_id: RoomId },
    /// A game-specific move, forwarded untouched to the game.
    MakeMove(Value),
    /// Vote to play again once the game is over.
    RematchRequest,
    /// A chat line for the caller's room.
    ChatMessage { message: String },
    /// Rename the live connection.
    UpdateDisplayName { display_name: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomPayload {
    room_id: String,
}

#[derive(Deserialize)]
struct ChatPayload {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayNamePayload {
    display_name: String,
}

fn payload_as<T: serde::de::DeserializeOwned>(
    payload: Option<Value>,
    kind: &'static str,
) -> Result<T, ProtocolError> {
    let value = payload.ok_or(ProtocolError::InvalidPayload(kind))?;
    serde_json::from_value(value).map_err(|_| ProtocolError::InvalidPayload(kind))
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        match env.kind.as_str() {
            "join_room" => {
                let p: JoinRoomPayload = payload_as(env.payload, "join_room")?;
                Ok(Self::JoinRoom {
                    room_id: p.room_id.parse()?,
                })
            }
            "make_move" => env
                .payload
                .map(Self::MakeMove)
                .ok_or(ProtocolError::InvalidMove),
            "rematch_request" => Ok(Self::RematchRequest),
            "chat_message" => {
                let p: ChatPayload = payload_as(env.payload, "chat_message")?;
                Ok(Self::ChatMessage { message: p.message })
            }
            "update_display_name" => {
                let p: DisplayNamePayload =
                    payload_as(env.payload, "update_display_name")?;
                Ok(Self::UpdateDisplayName {
                    display_name: p.display_name,
                })
            }
            _ => Err(ProtocolError::UnknownType(env.kind)),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Full state of one room, broadcast to all of its members after every
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub game_type: String,
    /// Seated players' display names, seat 0 first.
    pub players: Vec<String>,
    /// Spectators' display names in join order.
    pub spectators: Vec<String>,
    pub player_count: usize,
    pub spectator_count: usize,
    pub max_players: usize,
    /// `true` once every seat is taken.
    pub can_start: bool,
    /// The game's own state snapshot, opaque to the server.
    pub game: Value,
    /// Rematch votes cast since the game ended.
    pub rematch_count: usize,
}

/// One accepted chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    pub display_name: String,
    /// The message as broadcast, possibly censored.
    pub message: String,
    /// RFC 3339 UTC timestamp of acceptance.
    pub timestamp: String,
}

/// Whether a connection is currently in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    InGame,
}

/// One row of the fleet-wide presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub display_name: String,
    pub status: ConnectionStatus,
    /// Game type of the room the connection is in, if any.
    pub game_type: Option<String>,
}

/// A message from the server to a client.
///
/// Adjacent tagging yields exactly the `{type, payload}` envelope:
///
/// ```text
/// ServerMessage::Error { message: "x" }  →  {"type":"error","payload":{"message":"x"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after accept, and again after a successful rename.
    #[serde(rename_all = "camelCase")]
    ConnectionReady { display_name: String },

    /// Reply to the joiner only.
    #[serde(rename_all = "camelCase")]
    JoinSuccess { room_id: RoomId, role: Role },

    /// The host left; the room no longer exists.
    RoomClosed { message: String },

    /// A request was rejected.
    Error { message: String },

    /// Room state broadcast.
    GameStateUpdate(RoomSnapshot),

    /// Chat broadcast.
    ChatMessage(ChatLine),

    /// Presence broadcast to every live connection.
    ConnectionsUpdate(Vec<ConnectionEntry>),
}

impl ServerMessage {
    /// Shorthand for an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire name of this message's type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionReady { .. } => "connection_ready",
            Self::JoinSuccess { .. } => "join_success",
            Self::RoomClosed { .. } => "room_closed",
            Self::Error { .. } => "error",
            Self::GameStateUpdate(_) => "game_state_update",
            Self::ChatMessage(_) => "chat_message",
            Self::ConnectionsUpdate(_) => "connections_update",
        }
    }
}
