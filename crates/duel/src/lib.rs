//! # Duel
//!
//! Realtime rooms for turn-based two-player games over WebSocket.
//!
//! Clients connect, get a unique display name, join a persisted room by
//! id as a player or spectator, and play. The server owns the game state
//! and broadcasts it to the room after every change, alongside chat and a
//! server-wide presence list.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duel::prelude::*;
//!
//! # async fn start() -> Result<(), DuelError> {
//! let config = ServerConfig::load(None)?;
//! let server = DuelServerBuilder::new().config(config).build().await?;
//! server.run().await
//! # }
//! ```

pub mod config;
mod error;
mod handler;
pub mod logging;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::DuelError;
pub use server::{DuelServer, DuelServerBuilder};

/// Everything needed to start a server or add a game.
pub mod prelude {
    pub use crate::config::{ConfigError, SeedRoom, ServerConfig};
    pub use crate::logging::init_logging;
    pub use crate::{DuelError, DuelServer, DuelServerBuilder};

    pub use duel_games::{NIM, TIC_TAC_TOE, builtin_registry};
    pub use duel_protocol::{Role, RoomId, ServerMessage};
    pub use duel_room::{Game, GameRegistry, Manager, ManagerConfig, MoveError, Outcome};
    pub use duel_store::{MemoryStore, Store};
}
