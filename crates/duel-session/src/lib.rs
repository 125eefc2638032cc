//! Live connection handles for Duel.
//!
//! This crate handles the identity side of a connection:
//!
//! 1. **Client handle** - [`Client`]: id, display name, outbound queue,
//!    room back-reference, idempotent teardown flag.
//! 2. **Display names** - generation with bounded retries against the
//!    connection registry, validation, and renaming.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← broadcasts through Client handles
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol + Store Layers (below)
//! ```

mod client;
mod error;
mod names;

pub use client::{Client, Frame, OutboundReceiver};
pub use error::SessionError;
pub use names::{
    MAX_DISPLAY_NAME_CHARS, NAME_PREFIXES, generate_display_name,
    normalize_display_name, register_display_name, register_with,
    rename_display_name,
};
