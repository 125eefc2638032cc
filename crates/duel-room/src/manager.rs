//! Manager: the process-wide registry of connections and rooms.
//!
//! The Manager is the only component that creates Rooms or drops them
//! from the registry. It owns one `RwLock` over both maps.
//!
//! # Lock order
//!
//! Manager lock, then Room lock, never the reverse. Room operations
//! report "drop me" through their return value; the Manager acts on that
//! after the Room call has returned and its lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use duel_protocol::{
    Codec, ConnectionEntry, ConnectionId, ConnectionStatus, JsonCodec, Role, RoomId,
    ServerMessage,
};
use duel_session::{Client, Frame, OutboundReceiver, register_display_name, rename_display_name};
use duel_store::{Store, StoreError, with_timeout};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::room::Departure;
use crate::{ChatModerator, GameRegistry, ManagerConfig, Room, RoomError};

const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Registry {
    clients: HashMap<ConnectionId, Arc<Client>>,
    rooms: HashMap<RoomId, Arc<Room>>,
}

/// Tracks every live connection and every active room.
///
/// Construct one per server and share it as `Arc<Manager<S>>`.
pub struct Manager<S: Store> {
    store: Arc<S>,
    games: GameRegistry,
    moderator: Arc<ChatModerator>,
    config: ManagerConfig,
    registry: RwLock<Registry>,
}

impl<S: Store> Manager<S> {
    /// Creates a manager with empty registries.
    pub fn new(store: Arc<S>, games: GameRegistry, config: ManagerConfig) -> Self {
        let moderator = Arc::new(ChatModerator::new(config.chat.clone()));
        Self {
            store,
            games,
            moderator,
            config,
            registry: RwLock::new(Registry::default()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn games(&self) -> &GameRegistry {
        &self.games
    }

    pub fn moderator(&self) -> &ChatModerator {
        &self.moderator
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.clients.len()
    }

    /// Number of resident rooms.
    pub async fn room_count(&self) -> usize {
        self.registry.read().await.rooms.len()
    }

    /// The resident room with this id, if any.
    pub async fn room(&self, id: RoomId) -> Option<Arc<Room>> {
        self.registry.read().await.rooms.get(&id).cloned()
    }

    // ---------------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------------

    /// Registers a freshly accepted connection under a generated display
    /// name.
    ///
    /// Sends `connection_ready` to the new client and a presence update to
    /// everyone. Returns the client handle and the receiver its writer
    /// pump drains.
    ///
    /// # Errors
    /// [`RoomError::Session`] when no unique name could be registered.
    pub async fn register_connection(
        &self,
    ) -> Result<(Arc<Client>, OutboundReceiver), RoomError> {
        let display_name = register_display_name(
            &*self.store,
            self.config.store_timeout,
            self.config.name_retries,
        )
        .await?;

        let (client, rx) = Client::new(
            ConnectionId::new_v4(),
            display_name.clone(),
            self.config.outbound_queue,
        );
        self.registry
            .write()
            .await
            .clients
            .insert(client.id(), Arc::clone(&client));

        tracing::info!(conn_id = %client.id(), %display_name, "connection registered");
        client.send(&ServerMessage::ConnectionReady { display_name });
        self.broadcast_connections().await;
        Ok((client, rx))
    }

    /// Removes a connection from its room and from the registry.
    ///
    /// Runs once per client; later calls return immediately. If the room
    /// should go, it is dropped from the registry, and if the host left
    /// its persisted record is deleted in the background. The connection
    /// record is deleted in the background too; failures there are only
    /// logged.
    pub async fn teardown_connection(&self, client: &Arc<Client>) {
        if !client.begin_teardown() {
            return;
        }

        if let Some(room_id) = client.room() {
            let room = self.room(room_id).await;
            if let Some(room) = room {
                let departure = room.remove_client(client).await;
                if departure.should_delete() {
                    self.forget_room(room_id, &room).await;
                }
                if departure == Departure::HostLeft {
                    self.spawn_delete_room(room_id);
                }
            }
        }

        self.registry.write().await.clients.remove(&client.id());
        client.close_outbound();
        self.moderator.forget(client.id());

        let display_name = client.display_name();
        self.spawn_delete_connection(display_name.clone());
        tracing::info!(conn_id = %client.id(), %display_name, "connection closed");

        self.broadcast_connections().await;
    }

    /// Renames a connection that is not in a room.
    ///
    /// On success the client gets `connection_ready` with the new name and
    /// everyone gets a presence update.
    pub async fn rename_connection(
        &self,
        client: &Client,
        requested: &str,
    ) -> Result<(), RoomError> {
        if client.room().is_some() {
            return Err(RoomError::RenameInRoom);
        }
        let current = client.display_name();
        let display_name =
            rename_display_name(&*self.store, self.config.store_timeout, &current, requested)
                .await?;
        if display_name != current {
            client.set_display_name(display_name.clone());
            tracing::info!(conn_id = %client.id(), from = %current, to = %display_name, "display name changed");
        }
        client.send(&ServerMessage::ConnectionReady { display_name });
        self.broadcast_connections().await;
        Ok(())
    }

    /// Deletes connection records left behind by a previous process.
    ///
    /// Call before accepting any connection: every record present at that
    /// point is stale. Returns how many were removed.
    ///
    /// # Errors
    /// Listing the records failed. Individual delete failures are logged
    /// and skipped.
    pub async fn reconcile_startup(&self) -> Result<usize, RoomError> {
        let timeout = self.config.store_timeout;
        let stale = with_timeout(timeout, self.store.list_connections()).await?;

        let mut removed = 0;
        for record in &stale {
            match with_timeout(timeout, self.store.delete_connection(&record.display_name)).await
            {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(display_name = %record.display_name, error = %e, "could not delete stale connection");
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "removed stale connection records");
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Rooms
    // ---------------------------------------------------------------------

    /// Returns the resident room for `room_id`, activating it from its
    /// persisted record if needed.
    ///
    /// The registry's write lock is held across the lookup, so concurrent
    /// callers for the same id get the same Room and the record is loaded
    /// once. A resident room that has been closed is replaced.
    pub async fn resolve_or_activate_room(&self, room_id: RoomId) -> Result<Arc<Room>, RoomError> {
        let mut registry = self.registry.write().await;
        if let Some(room) = registry.rooms.get(&room_id) {
            if !room.is_closed() {
                return Ok(Arc::clone(room));
            }
        }

        let record = match with_timeout(self.config.store_timeout, self.store.get_room(room_id))
            .await
        {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Err(RoomError::RoomNotFound(room_id)),
            Err(e) => {
                tracing::warn!(%room_id, error = %e, "room lookup failed");
                return Err(RoomError::RoomLookup(e));
            }
        };
        let (game, max_players) = self.games.create(&record.game_type)?;

        let room = Arc::new(Room::new(
            &record,
            game,
            max_players,
            Arc::clone(&self.moderator),
        ));
        registry.rooms.insert(room_id, Arc::clone(&room));
        tracing::info!(
            %room_id,
            game_type = %record.game_type,
            host = %record.host_display_name,
            "room activated"
        );
        Ok(room)
    }

    /// Puts a connection into a room and returns its role.
    ///
    /// If the room is retired between lookup and join, the lookup runs
    /// once more and the join goes to the fresh room.
    pub async fn join_room(&self, client: &Arc<Client>, room_id: RoomId) -> Result<Role, RoomError> {
        if client.room().is_some_and(|current| current != room_id) {
            return Err(RoomError::AlreadyInAnotherRoom);
        }

        let mut retried = false;
        let role = loop {
            let room = self.resolve_or_activate_room(room_id).await?;
            match room
                .add_client(client, &*self.store, self.config.store_timeout)
                .await
            {
                Err(RoomError::Closed(_)) if !retried && !client.is_torn_down() => {
                    tracing::debug!(%room_id, conn_id = %client.id(), "room closed during join, retrying");
                    retried = true;
                }
                result => break result?,
            }
        };

        self.broadcast_connections().await;
        Ok(role)
    }

    /// Forwards a move to the client's room.
    pub async fn make_move(&self, client: &Client, mv: &Value) -> Result<(), RoomError> {
        self.current_room(client).await?.handle_move(client, mv).await
    }

    /// Casts a rematch vote in the client's room.
    pub async fn request_rematch(&self, client: &Client) -> Result<(), RoomError> {
        self.current_room(client).await?.handle_rematch(client).await
    }

    /// Sends a chat message to the client's room.
    pub async fn send_chat(&self, client: &Client, text: &str) -> Result<(), RoomError> {
        self.current_room(client).await?.handle_chat(client, text).await
    }

    async fn current_room(&self, client: &Client) -> Result<Arc<Room>, RoomError> {
        let room_id = client.room().ok_or(RoomError::NotInRoom)?;
        self.room(room_id).await.ok_or(RoomError::NotInRoom)
    }

    /// Drops `room` from the registry if it is still the resident room
    /// for `room_id`. Returns `true` if it was removed.
    async fn forget_room(&self, room_id: RoomId, room: &Arc<Room>) -> bool {
        let mut registry = self.registry.write().await;
        let resident = registry
            .rooms
            .get(&room_id)
            .is_some_and(|r| Arc::ptr_eq(r, room));
        if resident {
            registry.rooms.remove(&room_id);
            tracing::info!(%room_id, "room removed");
        }
        resident
    }

    /// Drops every resident room that has no members.
    ///
    /// Candidates are collected under the read lock, then re-checked
    /// under the write lock so a room that gained a member in between is
    /// kept. Returns the number of rooms removed.
    pub async fn sweep_stale_rooms(&self) -> usize {
        let resident: Vec<(RoomId, Arc<Room>)> = {
            let registry = self.registry.read().await;
            registry
                .rooms
                .iter()
                .map(|(id, room)| (*id, Arc::clone(room)))
                .collect()
        };
        let mut candidates = Vec::new();
        for (id, room) in resident {
            if room.member_count().await == 0 {
                candidates.push((id, room));
            }
        }
        if candidates.is_empty() {
            return 0;
        }

        let mut registry = self.registry.write().await;
        let mut removed = 0;
        for (id, room) in candidates {
            let resident = registry
                .rooms
                .get(&id)
                .is_some_and(|r| Arc::ptr_eq(r, &room));
            if resident && room.close_if_empty().await {
                registry.rooms.remove(&id);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "swept stale rooms");
        }
        removed
    }

    /// Starts the background task that sweeps stale rooms and prunes chat
    /// history on their configured intervals.
    ///
    /// The task holds only a weak reference and exits once the Manager is
    /// dropped. Intervals shorter than one millisecond (including zero)
    /// are raised to one millisecond.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let sweep_every = self.config.sweep_interval.max(MIN_MAINTENANCE_INTERVAL);
        let prune_every = self.config.chat.prune_interval.max(MIN_MAINTENANCE_INTERVAL);

        tokio::spawn(async move {
            let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
            let mut prune = interval_at(Instant::now() + prune_every, prune_every);
            loop {
                tokio::select! {
                    _ = sweep.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.sweep_stale_rooms().await;
                    }
                    _ = prune.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        let tracked = manager.moderator.prune();
                        tracing::debug!(tracked, "pruned chat history");
                    }
                }
            }
        })
    }

    // ---------------------------------------------------------------------
    // Presence
    // ---------------------------------------------------------------------

    /// Current presence list, sorted by display name.
    pub async fn connections(&self) -> Vec<ConnectionEntry> {
        let registry = self.registry.read().await;
        Self::entries(&registry)
    }

    fn entries(registry: &Registry) -> Vec<ConnectionEntry> {
        let mut entries: Vec<ConnectionEntry> = registry
            .clients
            .values()
            .map(|client| {
                let room = client.room().and_then(|id| registry.rooms.get(&id));
                ConnectionEntry {
                    display_name: client.display_name(),
                    status: if room.is_some() {
                        ConnectionStatus::InGame
                    } else {
                        ConnectionStatus::Idle
                    },
                    game_type: room.map(|r| r.game_type().to_string()),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        entries
    }

    /// Sends the presence list to every live connection.
    ///
    /// Takes the write lock so concurrent broadcasts queue their frames
    /// one after another; the last list a client receives is the newest.
    pub async fn broadcast_connections(&self) {
        let registry = self.registry.write().await;
        let msg = ServerMessage::ConnectionsUpdate(Self::entries(&registry));
        let frame = match JsonCodec.encode(&msg) {
            Ok(text) => Frame::from(text),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode connections update");
                return;
            }
        };
        for client in registry.clients.values() {
            client.send_frame(Arc::clone(&frame));
        }
    }

    // ---------------------------------------------------------------------
    // Background persistence
    // ---------------------------------------------------------------------

    fn spawn_delete_room(&self, room_id: RoomId) {
        let store = Arc::clone(&self.store);
        let timeout = self.config.store_timeout;
        tokio::spawn(async move {
            match with_timeout(timeout, store.delete_room(room_id)).await {
                Ok(()) => tracing::debug!(%room_id, "room record deleted"),
                Err(e) => tracing::warn!(%room_id, error = %e, "could not delete room record"),
            }
        });
    }

    fn spawn_delete_connection(&self, display_name: String) {
        let store = Arc::clone(&self.store);
        let timeout = self.config.store_timeout;
        tokio::spawn(async move {
            if let Err(e) = with_timeout(timeout, store.delete_connection(&display_name)).await {
                tracing::warn!(%display_name, error = %e, "could not delete connection record");
            }
        });
    }
}

impl<S: Store> std::fmt::Debug for Manager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("games", &self.games)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
