//! Rooms and the connection registry for Duel.
//!
//! This is the realtime core. A [`Manager`] tracks every live connection
//! and every active [`Room`]; each Room runs one match through a boxed
//! [`Game`] and fans state out to its members.
//!
//! # Key types
//!
//! - [`Game`]: the trait rule engines implement
//! - [`GameRegistry`]: maps game-type strings to factories
//! - [`Room`]: one match: seats, spectators, rematch votes, broadcast
//! - [`Manager`]: activates rooms, routes requests, tears connections down
//! - [`ChatModerator`]: rate limit and profanity filter for chat
//! - [`ManagerConfig`] / [`ChatConfig`]: tunables

mod config;
mod error;
mod game;
mod manager;
mod moderation;
mod room;

pub use config::{ChatConfig, ManagerConfig};
pub use error::RoomError;
pub use game::{Game, GameFactory, GameRegistry, MoveError, Outcome, SEATS};
pub use manager::Manager;
pub use moderation::{ChatModerator, ChatRejection, censor};
pub use room::{Departure, HOST_LEFT_MESSAGE, Room};
