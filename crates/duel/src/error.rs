//! Unified error type for the Duel server.

use duel_protocol::ProtocolError;
use duel_room::RoomError;
use duel_session::SessionError;
use duel_store::StoreError;
use duel_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// A transport-level error (bind, accept, handshake, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A storage error outside any room operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Display-name registration failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room or manager operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
