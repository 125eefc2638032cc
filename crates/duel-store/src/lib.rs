//! Storage collaborators for Duel.
//!
//! The realtime core reads room records, persists seated players, and
//! keeps a registry of live display names. This crate defines those
//! interfaces ([`RoomStore`], [`PlayerStore`], [`ConnectionStore`],
//! bundled as [`Store`]), the records they exchange, and [`MemoryStore`],
//! an in-process implementation.
//!
//! ```text
//! Manager / Room (above)  ← call the traits with a bounded timeout
//!     ↕
//! Store layer (this crate)
//! ```

mod error;
mod memory;
mod record;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{ConnectionRecord, PlayerRecord, RoomRecord};
pub use store::{ConnectionStore, PlayerStore, RoomStore, Store, with_timeout};
