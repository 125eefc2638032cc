//! An in-process [`Store`](crate::Store) backed by hash maps.
//!
//! Used by the `duel-server` binary when no external database is wired
//! in, and by tests. It enforces the same uniqueness rules a relational
//! schema would, so the realtime core sees realistic errors. Two knobs
//! make failure paths reachable: [`MemoryStore::set_latency`] delays
//! every call, and [`MemoryStore::set_unavailable`] makes every call fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use duel_protocol::RoomId;

use crate::{
    ConnectionRecord, ConnectionStore, PlayerRecord, PlayerStore, RoomRecord,
    RoomStore, StoreError,
};

#[derive(Default)]
struct Tables {
    rooms: HashMap<RoomId, RoomRecord>,
    /// Unique on (room, display name).
    players: Vec<PlayerRecord>,
    /// Keyed (and therefore unique) by display name.
    connections: HashMap<String, ConnectionRecord>,
}

/// Hash-map store. Cheap to construct; share it behind an `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    latency: Mutex<Duration>,
    unavailable: AtomicBool,
    room_lookups: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a room record, as the room-creation API would.
    pub fn insert_room(
        &self,
        id: RoomId,
        name: &str,
        game_type: &str,
        host_display_name: &str,
    ) -> RoomRecord {
        let record = RoomRecord {
            id,
            name: name.to_string(),
            game_type: game_type.to_string(),
            host_display_name: host_display_name.to_string(),
            created_at: Utc::now(),
        };
        self.tables().rooms.insert(id, record.clone());
        record
    }

    /// Player rows recorded for one room, ordered by seat.
    pub fn players_in(&self, room_id: RoomId) -> Vec<PlayerRecord> {
        let mut rows: Vec<_> = self
            .tables()
            .players
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.order);
        rows
    }

    /// `true` if a room record with this id exists.
    pub fn has_room(&self, id: RoomId) -> bool {
        self.tables().rooms.contains_key(&id)
    }

    /// How many times [`RoomStore::get_room`] has been called.
    pub fn room_lookups(&self) -> usize {
        self.room_lookups.load(Ordering::SeqCst)
    }

    /// Delays every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// When `true`, every subsequent call fails with `StoreError::Database`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".into()));
        }
        Ok(())
    }
}

impl RoomStore for MemoryStore {
    async fn get_room(&self, id: RoomId) -> Result<RoomRecord, StoreError> {
        self.room_lookups.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        self.tables()
            .rooms
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {id}")))
    }

    async fn delete_room(&self, id: RoomId) -> Result<(), StoreError> {
        self.round_trip().await?;
        let mut tables = self.tables();
        tables.rooms.remove(&id);
        tables.players.retain(|p| p.room_id != id);
        Ok(())
    }
}

impl PlayerStore for MemoryStore {
    async fn create_player(
        &self,
        room_id: RoomId,
        display_name: &str,
        order: i16,
    ) -> Result<PlayerRecord, StoreError> {
        self.round_trip().await?;
        let mut tables = self.tables();
        if !tables.rooms.contains_key(&room_id) {
            return Err(StoreError::Database(format!(
                "foreign key violated: room {room_id}"
            )));
        }
        if tables
            .players
            .iter()
            .any(|p| p.room_id == room_id && p.display_name == display_name)
        {
            return Err(StoreError::UniqueViolation(format!(
                "player {display_name} in room {room_id}"
            )));
        }
        let record = PlayerRecord {
            room_id,
            display_name: display_name.to_string(),
            order,
            joined_at: Utc::now(),
        };
        tables.players.push(record.clone());
        Ok(record)
    }
}

impl ConnectionStore for MemoryStore {
    async fn create_connection(
        &self,
        display_name: &str,
    ) -> Result<ConnectionRecord, StoreError> {
        self.round_trip().await?;
        let mut tables = self.tables();
        if tables.connections.contains_key(display_name) {
            return Err(StoreError::UniqueViolation(format!(
                "connection {display_name}"
            )));
        }
        let record = ConnectionRecord {
            display_name: display_name.to_string(),
            connected_at: Utc::now(),
        };
        tables
            .connections
            .insert(display_name.to_string(), record.clone());
        Ok(record)
    }

    async fn get_connection(
        &self,
        display_name: &str,
    ) -> Result<ConnectionRecord, StoreError> {
        self.round_trip().await?;
        self.tables()
            .connections
            .get(display_name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("connection {display_name}")))
    }

    async fn delete_connection(&self, display_name: &str) -> Result<(), StoreError> {
        self.round_trip().await?;
        let mut tables = self.tables();
        tables.connections.remove(display_name);
        tables.players.retain(|p| p.display_name != display_name);
        Ok(())
    }

    async fn rename_connection(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> Result<ConnectionRecord, StoreError> {
        self.round_trip().await?;
        let mut tables = self.tables();
        if tables.connections.contains_key(new_name) {
            return Err(StoreError::UniqueViolation(format!(
                "connection {new_name}"
            )));
        }
        let mut record = tables
            .connections
            .remove(old_name)
            .ok_or_else(|| StoreError::NotFound(format!("connection {old_name}")))?;
        record.display_name = new_name.to_string();
        tables
            .connections
            .insert(new_name.to_string(), record.clone());
        for player in tables.players.iter_mut().filter(|p| p.display_name == old_name) {
            player.display_name = new_name.to_string();
        }
        Ok(record)
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>, StoreError> {
        self.round_trip().await?;
        let mut all: Vec<_> = self.tables().connections.values().cloned().collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::with_timeout;

    #[tokio::test]
    async fn test_create_connection_rejects_duplicate_name() {
        let store = MemoryStore::new();
        store.create_connection("Alice#1000").await.expect("first");
        let err = store
            .create_connection("Alice#1000")
            .await
            .expect_err("duplicate");
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_delete_connection_cascades_to_players() {
        let store = MemoryStore::new();
        let room = RoomId::new_v4();
        store.insert_room(room, "r", "tic-tac-toe", "Host#1");
        store.create_connection("Bob#2000").await.expect("conn");
        store.create_player(room, "Bob#2000", 0).await.expect("player");

        store.delete_connection("Bob#2000").await.expect("delete");

        assert!(store.players_in(room).is_empty());
        assert!(store.list_connections().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_records_is_ok() {
        let store = MemoryStore::new();
        store.delete_connection("nobody").await.expect("connection");
        store.delete_room(RoomId::new_v4()).await.expect("room");
    }

    #[tokio::test]
    async fn test_create_player_twice_is_unique_violation() {
        let store = MemoryStore::new();
        let room = RoomId::new_v4();
        store.insert_room(room, "r", "nim", "Host#1");
        store.create_player(room, "Bob#2000", 1).await.expect("first");
        let err = store
            .create_player(room, "Bob#2000", 1)
            .await
            .expect_err("second");
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_get_missing_room_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_room(RoomId::new_v4()).await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.room_lookups(), 1);
    }

    #[tokio::test]
    async fn test_rename_connection() {
        let store = MemoryStore::new();
        store.create_connection("Alice#1000").await.expect("a");
        store.create_connection("Bob#2000").await.expect("b");

        let err = store
            .rename_connection("Alice#1000", "Bob#2000")
            .await
            .expect_err("taken");
        assert!(err.is_unique_violation());

        store
            .rename_connection("Alice#1000", "Carol")
            .await
            .expect("rename");
        assert!(store.get_connection("Carol").await.is_ok());
        assert!(store.get_connection("Alice#1000").await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.create_connection("x").await.expect_err("down");
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let store = MemoryStore::new();
        store.set_latency(Duration::from_secs(30));
        let err = with_timeout(Duration::from_secs(5), store.list_connections())
            .await
            .expect_err("slow");
        assert!(matches!(err, StoreError::Timeout(_)));
    }
}
