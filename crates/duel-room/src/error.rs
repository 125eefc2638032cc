//! Error types for the room layer.
//!
//! The `Display` text of most variants is exactly what the client sees in
//! the `error` message. Variants that wrap infrastructure failures are
//! mapped to generic text by [`RoomError::client_message`] so storage
//! details never reach a client.

use duel_protocol::RoomId;
use duel_session::SessionError;
use duel_store::StoreError;

use crate::{ChatRejection, MoveError};

/// Errors that can occur during room and manager operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The connection is not a member of any resident room.
    #[error("Not in a room.")]
    NotInRoom,

    /// The connection is already a member of a different room.
    #[error("You are already in another room.")]
    AlreadyInAnotherRoom,

    /// No persisted room has this id.
    #[error("Room not found in database.")]
    RoomNotFound(RoomId),

    /// The room's game type has no registered factory.
    #[error("Error creating game instance: unsupported game type '{0}'")]
    UnsupportedGame(String),

    /// Recording the seated player failed for a reason other than the
    /// player already being recorded.
    #[error("Failed to join room: could not save player data.")]
    PlayerPersistence(#[source] StoreError),

    /// Loading the room record failed for a reason other than not-found.
    #[error("Failed to join room, please try again.")]
    RoomLookup(#[source] StoreError),

    /// The room was retired between lookup and join.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// A spectator sent a move.
    #[error("Spectators cannot make moves.")]
    SpectatorMove,

    /// A spectator voted for a rematch.
    #[error("Spectators cannot request a rematch.")]
    SpectatorRematch,

    /// A rematch vote arrived while the game is still running.
    #[error("The game is not over yet.")]
    GameNotOver,

    /// The game rejected the move.
    #[error(transparent)]
    Move(#[from] MoveError),

    /// The moderator rejected a chat message.
    #[error(transparent)]
    Chat(#[from] ChatRejection),

    /// Renaming is only allowed outside rooms: the host is recognised by
    /// display name.
    #[error("Cannot change display name while in a room.")]
    RenameInRoom,

    /// Display-name registration or rename failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A store call outside the join path failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// The text to put in the `error` message sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Closed(_) => "Room is closing, please try again.".into(),
            Self::Session(SessionError::Store(_))
            | Self::Session(SessionError::NamesExhausted { .. })
            | Self::Store(_) => "Internal server error, please try again.".into(),
            other => other.to_string(),
        }
    }
}
