//! Wire protocol for Duel.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`],
//!   [`RoomId`], [`Role`], ...): the message structures on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to/from text frames.
//! - **Errors** ([`ProtocolError`]): what can go wrong, and the exact
//!   text a client sees when it does.
//!
//! The protocol layer knows nothing about connections or rooms.
//!
//! ```text
//! Transport (text frames) → Protocol (ClientMessage) → Manager / Room
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ChatLine, ClientMessage, ConnectionEntry, ConnectionId, ConnectionStatus,
    Envelope, Role, RoomId, RoomSnapshot, ServerMessage,
};
