//! Room: the in-memory aggregate of one match.
//!
//! A Room owns its member list, its [`Game`], and the pending rematch
//! votes, all behind one `RwLock`. Every mutation follows the same
//! pattern: take the write lock, change state, queue the resulting
//! frames for the members, release the lock. Queuing never waits (see
//! [`Client::send_frame`]), so a slow member cannot stall the room, and
//! members see state updates in the order the changes were made.
//!
//! A Room never touches the Manager's registry. Operations that might
//! require the room to be dropped from the registry report that through
//! their return value ([`Departure`]) and leave the removal to the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use duel_protocol::{
    ChatLine, Codec, ConnectionId, JsonCodec, Role, RoomId, RoomSnapshot, ServerMessage,
};
use duel_session::{Client, Frame};
use duel_store::{PlayerStore, RoomRecord, with_timeout};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{ChatModerator, ChatRejection, Game, RoomError};

/// Text of the `room_closed` message sent when the host leaves.
pub const HOST_LEFT_MESSAGE: &str = "The host has left the room.";

/// What happened when a connection left a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The connection was not a member; nothing changed.
    NotMember,
    /// Other members remain and the room stays open.
    Stayed,
    /// The last member left.
    Emptied,
    /// The host left and the room was closed for everyone.
    HostLeft,
}

impl Departure {
    /// `true` when the caller should drop the room from its registry.
    pub fn should_delete(self) -> bool {
        matches!(self, Self::Emptied | Self::HostLeft)
    }
}

struct Member {
    client: Arc<Client>,
    role: Role,
    joined_at: Instant,
}

struct RoomInner {
    /// In join order.
    members: Vec<Member>,
    game: Box<dyn Game>,
    rematch_votes: HashSet<ConnectionId>,
}

impl RoomInner {
    fn member(&self, id: ConnectionId) -> Option<&Member> {
        self.members.iter().find(|m| m.client.id() == id)
    }

    fn seated(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.role.is_player())
    }

    /// Lowest seat below `max_players` that nobody holds.
    fn free_seat(&self, max_players: usize) -> Option<Role> {
        (0..max_players)
            .filter_map(Role::for_seat)
            .find(|role| self.members.iter().all(|m| m.role != *role))
    }
}

/// One active match: up to two seated players and any number of
/// spectators.
pub struct Room {
    id: RoomId,
    game_type: String,
    host_name: String,
    max_players: usize,
    moderator: Arc<ChatModerator>,
    /// Only set while holding the write lock on `inner`.
    closed: AtomicBool,
    inner: RwLock<RoomInner>,
}

impl Room {
    /// Builds an empty room for a persisted record.
    pub fn new(
        record: &RoomRecord,
        game: Box<dyn Game>,
        max_players: usize,
        moderator: Arc<ChatModerator>,
    ) -> Self {
        Self {
            id: record.id,
            game_type: record.game_type.clone(),
            host_name: record.host_display_name.clone(),
            max_players,
            moderator,
            closed: AtomicBool::new(false),
            inner: RwLock::new(RoomInner {
                members: Vec::new(),
                game,
                rematch_votes: HashSet::new(),
            }),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// `true` once the room has been retired. A closed room accepts no
    /// new members.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of members, players and spectators together.
    pub async fn member_count(&self) -> usize {
        self.inner.read().await.members.len()
    }

    /// The role held by a connection, if it is a member.
    pub async fn role_of(&self, id: ConnectionId) -> Option<Role> {
        self.inner.read().await.member(id).map(|m| m.role)
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Adds a connection and returns its role.
    ///
    /// The first free seat goes to the joiner; once both seats are taken
    /// everyone else spectates. A seated joiner is recorded through
    /// `players`; if that record already exists the join goes ahead.
    ///
    /// Joining a room one is already in returns the current role and
    /// sends nothing.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room was retired or the client is
    ///   being torn down.
    /// - [`RoomError::PlayerPersistence`] if the seat could not be
    ///   recorded. Nothing changes in that case.
    pub async fn add_client<P: PlayerStore>(
        &self,
        client: &Arc<Client>,
        players: &P,
        timeout: Duration,
    ) -> Result<Role, RoomError> {
        let role = {
            let mut inner = self.inner.write().await;
            if self.is_closed() || client.is_torn_down() {
                return Err(RoomError::Closed(self.id));
            }
            if let Some(member) = inner.member(client.id()) {
                return Ok(member.role);
            }

            let role = inner
                .free_seat(self.max_players)
                .unwrap_or(Role::Spectator);
            let display_name = client.display_name();

            if let Some(seat) = role.seat() {
                let order = seat as i16;
                match with_timeout(timeout, players.create_player(self.id, &display_name, order))
                    .await
                {
                    Ok(_) => {}
                    Err(e) if e.is_unique_violation() => {
                        tracing::debug!(room_id = %self.id, %display_name, "player already recorded");
                    }
                    Err(e) => {
                        tracing::warn!(room_id = %self.id, %display_name, error = %e, "could not record player");
                        return Err(RoomError::PlayerPersistence(e));
                    }
                }
            }

            client.set_room(Some(self.id));
            inner.members.push(Member {
                client: Arc::clone(client),
                role,
                joined_at: Instant::now(),
            });
            client.send(&ServerMessage::JoinSuccess {
                room_id: self.id,
                role,
            });

            tracing::info!(
                room_id = %self.id,
                %display_name,
                %role,
                members = inner.members.len(),
                "joined room"
            );
            self.fan_out_state(&inner);
            role
        };

        Ok(role)
    }

    /// Removes a connection.
    ///
    /// If the leaver is the host, every remaining member gets a
    /// `room_closed` message, all back-references are cleared, and the
    /// room is closed. If the leaver was the last member the room is
    /// closed too. Otherwise the remaining members get a state update.
    pub async fn remove_client(&self, client: &Client) -> Departure {
        let (departure, evicted) = {
            let mut inner = self.inner.write().await;
            let Some(pos) = inner.members.iter().position(|m| m.client.id() == client.id()) else {
                return Departure::NotMember;
            };
            let member = inner.members.remove(pos);
            inner.rematch_votes.remove(&client.id());
            member.client.set_room(None);

            let display_name = member.client.display_name();
            tracing::info!(
                room_id = %self.id,
                %display_name,
                role = %member.role,
                stayed_for = ?member.joined_at.elapsed(),
                "left room"
            );

            if display_name == self.host_name {
                let evicted = std::mem::take(&mut inner.members);
                for m in &evicted {
                    m.client.set_room(None);
                }
                inner.rematch_votes.clear();
                self.closed.store(true, Ordering::Release);
                (Departure::HostLeft, evicted)
            } else if inner.members.is_empty() {
                self.closed.store(true, Ordering::Release);
                (Departure::Emptied, Vec::new())
            } else {
                self.fan_out_state(&inner);
                (Departure::Stayed, Vec::new())
            }
        };

        match departure {
            Departure::HostLeft => {
                tracing::info!(room_id = %self.id, evicted = evicted.len(), "host left, room closed");
                let notice = ServerMessage::RoomClosed {
                    message: HOST_LEFT_MESSAGE.to_string(),
                };
                for m in &evicted {
                    m.client.send(&notice);
                }
            }
            Departure::Stayed | Departure::Emptied | Departure::NotMember => {}
        }
        departure
    }

    /// Closes the room if it has no members. Returns `true` if the room
    /// is (now) closed and empty.
    pub async fn close_if_empty(&self) -> bool {
        let inner = self.inner.write().await;
        if !inner.members.is_empty() {
            return false;
        }
        self.closed.store(true, Ordering::Release);
        true
    }

    // -----------------------------------------------------------------
    // Game actions
    // -----------------------------------------------------------------

    /// Applies a move for the client's seat and broadcasts the result.
    ///
    /// A rejected move changes nothing and broadcasts nothing.
    pub async fn handle_move(&self, client: &Client, mv: &Value) -> Result<(), RoomError> {
        {
            let mut inner = self.inner.write().await;
            let role = inner
                .member(client.id())
                .map(|m| m.role)
                .ok_or(RoomError::NotInRoom)?;
            let seat = role.seat().ok_or(RoomError::SpectatorMove)?;
            inner.game.apply_move(seat, mv)?;
            tracing::debug!(room_id = %self.id, conn_id = %client.id(), seat, "move applied");
            if let Some(outcome) = inner.game.winner() {
                tracing::info!(room_id = %self.id, %outcome, "game over");
            }
            self.fan_out_state(&inner);
        }
        Ok(())
    }

    /// Records a rematch vote from a seated player.
    ///
    /// Every vote is followed by a state broadcast. When all seats are
    /// filled and every seated player has voted, the game resets, the two
    /// players swap seats, the votes clear, and a second broadcast goes
    /// out.
    pub async fn handle_rematch(&self, client: &Client) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        let role = inner
            .member(client.id())
            .map(|m| m.role)
            .ok_or(RoomError::NotInRoom)?;
        if !inner.game.is_finished() {
            return Err(RoomError::GameNotOver);
        }
        if !role.is_player() {
            return Err(RoomError::SpectatorRematch);
        }

        inner.rematch_votes.insert(client.id());
        self.fan_out_state(&inner);

        let seated = inner.seated().count();
        let all_voted = inner
            .seated()
            .all(|m| inner.rematch_votes.contains(&m.client.id()));
        if seated == self.max_players && all_voted {
            inner.game.reset();
            if self.max_players == crate::SEATS {
                for m in &mut inner.members {
                    m.role = m.role.swapped();
                }
            }
            inner.rematch_votes.clear();
            tracing::info!(room_id = %self.id, "rematch started");
            self.fan_out_state(&inner);
        }
        Ok(())
    }

    /// Moderates a chat message and broadcasts it.
    ///
    /// Whitespace-only messages are dropped without a reply.
    pub async fn handle_chat(&self, client: &Client, text: &str) -> Result<(), RoomError> {
        if self.role_of(client.id()).await.is_none() {
            return Err(RoomError::NotInRoom);
        }
        let message = match self.moderator.validate(client.id(), text) {
            Ok(message) => message,
            Err(ChatRejection::Empty) => return Ok(()),
            Err(rejection) => {
                tracing::debug!(room_id = %self.id, conn_id = %client.id(), %rejection, "chat rejected");
                return Err(rejection.into());
            }
        };

        let line = ChatLine {
            display_name: client.display_name(),
            message,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        self.broadcast_message(&ServerMessage::ChatMessage(line)).await;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Broadcast
    // -----------------------------------------------------------------

    /// Current room state.
    pub async fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.read().await;
        self.snapshot_of(&inner)
    }

    fn snapshot_of(&self, inner: &RoomInner) -> RoomSnapshot {
        let players: Vec<String> = (0..self.max_players)
            .filter_map(Role::for_seat)
            .filter_map(|role| inner.members.iter().find(|m| m.role == role))
            .map(|m| m.client.display_name())
            .collect();
        let spectators: Vec<String> = inner
            .members
            .iter()
            .filter(|m| m.role == Role::Spectator)
            .map(|m| m.client.display_name())
            .collect();

        RoomSnapshot {
            room_id: self.id,
            game_type: self.game_type.clone(),
            player_count: players.len(),
            spectator_count: spectators.len(),
            max_players: self.max_players,
            can_start: players.len() == self.max_players,
            game: inner.game.state(),
            rematch_count: inner.rematch_votes.len(),
            players,
            spectators,
        }
    }

    /// Sends the current state to every member.
    pub async fn broadcast_room_state(&self) {
        let inner = self.inner.read().await;
        self.fan_out_state(&inner);
    }

    /// Encodes `msg` once and queues it for every member.
    ///
    /// A member whose queue is full misses this message; the others
    /// still get it.
    pub async fn broadcast_message(&self, msg: &ServerMessage) {
        let inner = self.inner.read().await;
        self.fan_out(&inner, msg);
    }

    fn fan_out_state(&self, inner: &RoomInner) {
        let msg = ServerMessage::GameStateUpdate(self.snapshot_of(inner));
        self.fan_out(inner, &msg);
    }

    /// Queues `msg` for every member of `inner`. The caller holds the
    /// room lock, so frames from successive changes are queued in order.
    fn fan_out(&self, inner: &RoomInner, msg: &ServerMessage) {
        let frame = match JsonCodec.encode(msg) {
            Ok(text) => Frame::from(text),
            Err(e) => {
                tracing::error!(room_id = %self.id, kind = msg.kind(), error = %e, "failed to encode broadcast");
                return;
            }
        };
        let dropped = inner
            .members
            .iter()
            .filter(|m| !m.client.send_frame(Arc::clone(&frame)))
            .count();
        if dropped > 0 {
            tracing::debug!(room_id = %self.id, kind = msg.kind(), dropped, "broadcast not delivered to every member");
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("game_type", &self.game_type)
            .field("host_name", &self.host_name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
