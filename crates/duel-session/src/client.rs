//! The shared handle for one live connection.
//!
//! A [`Client`] is what the rest of the server holds on to while the
//! transport pumps run: the Manager's registry owns an `Arc<Client>` for
//! every live connection, and each Room keeps one per member. It carries:
//!
//! - WHO the connection is (`ConnectionId`, display name)
//! - WHERE it is (an optional `RoomId`, a lookup key rather than a
//!   pointer, so Room and Client never own each other)
//! - HOW to reach it (the sending side of a bounded outbound queue)
//!
//! # Backpressure
//!
//! [`Client::send`] never waits. When the queue is full the frame is
//! dropped for this client only; a slow reader loses messages instead of
//! stalling the room that is broadcasting to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use duel_protocol::{Codec, ConnectionId, JsonCodec, RoomId, ServerMessage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One encoded text frame. Shared so a broadcast encodes once.
pub type Frame = Arc<str>;

/// The receiving side of a client's outbound queue, drained by the
/// writer pump.
pub type OutboundReceiver = mpsc::Receiver<Frame>;

/// Shared handle for one live connection.
#[derive(Debug)]
pub struct Client {
    id: ConnectionId,
    display_name: RwLock<String>,
    /// `None` once the queue has been closed.
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    room: Mutex<Option<RoomId>>,
    torn_down: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Plain data behind the lock; a panicked holder cannot break it.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Client {
    /// Creates a client with an outbound queue of `capacity` frames.
    ///
    /// Returns the handle and the receiver the writer pump drains.
    pub fn new(
        id: ConnectionId,
        display_name: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let client = Arc::new(Self {
            id,
            display_name: RwLock::new(display_name.into()),
            outbound: Mutex::new(Some(tx)),
            room: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        });
        (client, rx)
    }

    /// The connection's unique id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The current display name.
    pub fn display_name(&self) -> String {
        self.display_name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replaces the display name.
    pub fn set_display_name(&self, name: impl Into<String>) {
        *self
            .display_name
            .write()
            .unwrap_or_else(|e| e.into_inner()) = name.into();
    }

    /// The room this connection is in, if any.
    pub fn room(&self) -> Option<RoomId> {
        *lock(&self.room)
    }

    /// Sets or clears the room back-reference.
    ///
    /// Only the Room calls this, while holding its own lock, so the
    /// back-reference and the Room's member set change together.
    pub fn set_room(&self, room: Option<RoomId>) {
        *lock(&self.room) = room;
    }

    /// Encodes and enqueues one message without waiting.
    ///
    /// Returns `true` if the frame was queued.
    pub fn send(&self, msg: &ServerMessage) -> bool {
        match JsonCodec.encode(msg) {
            Ok(text) => self.send_frame(Frame::from(text)),
            Err(e) => {
                tracing::error!(conn_id = %self.id, kind = msg.kind(), error = %e, "failed to encode message");
                false
            }
        }
    }

    /// Shorthand for sending an `error` message.
    pub fn send_error(&self, message: impl Into<String>) -> bool {
        self.send(&ServerMessage::error(message))
    }

    /// Enqueues an already encoded frame without waiting.
    ///
    /// A full queue drops the frame; a closed queue ignores it.
    pub fn send_frame(&self, frame: Frame) -> bool {
        let guard = lock(&self.outbound);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(conn_id = %self.id, "outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Closes the outbound queue.
    ///
    /// The writer pump drains what is already queued, then sends a close
    /// frame and exits. Later sends are ignored.
    pub fn close_outbound(&self) {
        lock(&self.outbound).take();
    }

    /// Claims the right to tear this connection down.
    ///
    /// Returns `true` for the first caller only, so teardown triggered
    /// from both pumps (or from both a pump and a forced close) runs once.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    /// `true` once teardown has started.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(capacity: usize) -> (Arc<Client>, OutboundReceiver) {
        Client::new(ConnectionId::new_v4(), "Alice#1000", capacity)
    }

    #[tokio::test]
    async fn test_send_encodes_envelope() {
        let (c, mut rx) = client(4);
        assert!(c.send_error("nope"));
        let frame = rx.recv().await.expect("frame");
        assert_eq!(&*frame, r#"{"type":"error","payload":{"message":"nope"}}"#);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (c, mut rx) = client(2);
        assert!(c.send_error("1"));
        assert!(c.send_error("2"));
        assert!(!c.send_error("3"), "third frame should be dropped");

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_outbound_ends_receiver_after_draining() {
        let (c, mut rx) = client(4);
        c.send_error("last words");
        c.close_outbound();

        assert!(!c.send_error("ignored"));
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_begin_teardown_only_once() {
        let (c, _rx) = client(1);
        assert!(!c.is_torn_down());
        assert!(c.begin_teardown());
        assert!(!c.begin_teardown());
        assert!(c.is_torn_down());
    }

    #[test]
    fn test_room_back_reference_and_rename() {
        let (c, _rx) = client(1);
        let room = RoomId::new_v4();
        c.set_room(Some(room));
        assert_eq!(c.room(), Some(room));
        c.set_room(None);
        assert_eq!(c.room(), None);

        c.set_display_name("Ada");
        assert_eq!(c.display_name(), "Ada");
    }
}
