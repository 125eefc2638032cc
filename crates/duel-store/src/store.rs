//! The storage interfaces the realtime core depends on.
//!
//! Duel does not own a database. Room records are created elsewhere (an
//! HTTP API, an admin tool, a seed file) and the realtime core only needs
//! a handful of narrow operations on them. Each concern gets its own
//! trait, and [`Store`] bundles the three so the rest of the server can
//! be generic over a single type parameter.
//!
//! Methods return `impl Future + Send` rather than using `async fn`, so
//! the futures can be awaited inside spawned tasks from generic code.

use std::future::Future;
use std::time::Duration;

use duel_protocol::RoomId;

use crate::{ConnectionRecord, PlayerRecord, RoomRecord, StoreError};

/// Read and delete persisted room records.
pub trait RoomStore: Send + Sync + 'static {
    /// Loads one room record.
    ///
    /// # Errors
    /// `StoreError::NotFound` when no such room exists.
    fn get_room(
        &self,
        id: RoomId,
    ) -> impl Future<Output = Result<RoomRecord, StoreError>> + Send;

    /// Deletes a room record. Deleting a missing room is not an error.
    fn delete_room(&self, id: RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Persist seated players.
pub trait PlayerStore: Send + Sync + 'static {
    /// Records that `display_name` sits at seat `order` in `room_id`.
    ///
    /// # Errors
    /// `StoreError::UniqueViolation` when the player is already recorded
    /// for this room.
    fn create_player(
        &self,
        room_id: RoomId,
        display_name: &str,
        order: i16,
    ) -> impl Future<Output = Result<PlayerRecord, StoreError>> + Send;
}

/// The registry of live connections, keyed by display name.
pub trait ConnectionStore: Send + Sync + 'static {
    /// Registers a display name.
    ///
    /// # Errors
    /// `StoreError::UniqueViolation` when the name is taken.
    fn create_connection(
        &self,
        display_name: &str,
    ) -> impl Future<Output = Result<ConnectionRecord, StoreError>> + Send;

    /// Loads one connection record.
    fn get_connection(
        &self,
        display_name: &str,
    ) -> impl Future<Output = Result<ConnectionRecord, StoreError>> + Send;

    /// Deletes a connection and, by cascade, its player rows. Deleting a
    /// missing connection is not an error.
    fn delete_connection(
        &self,
        display_name: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Renames a connection.
    ///
    /// # Errors
    /// `StoreError::UniqueViolation` when `new_name` is taken,
    /// `StoreError::NotFound` when `old_name` is not registered.
    fn rename_connection(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> impl Future<Output = Result<ConnectionRecord, StoreError>> + Send;

    /// Lists every registered connection.
    fn list_connections(
        &self,
    ) -> impl Future<Output = Result<Vec<ConnectionRecord>, StoreError>> + Send;
}

/// Everything the realtime core needs from storage.
///
/// Implemented automatically for any type that implements the three
/// concern traits.
pub trait Store: RoomStore + PlayerStore + ConnectionStore {}

impl<T: RoomStore + PlayerStore + ConnectionStore> Store for T {}

/// Runs a store call under a time bound.
///
/// A call that does not finish within `limit` yields
/// [`StoreError::Timeout`] and is cancelled.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
