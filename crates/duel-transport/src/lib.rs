//! Transport layer for Duel.
//!
//! A live connection is split into two independently owned halves so the
//! server can run one task that reads and another that writes:
//!
//! - [`FrameReader`] yields inbound [`Inbound`] frames (text, binary, pong).
//! - [`FrameWriter`] sends text frames, liveness pings, and the close frame.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

use std::future::Future;
use std::net::SocketAddr;

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingUpgrade, WebSocketConnection, WebSocketReader, WebSocketTransport,
    WebSocketWriter,
};

/// One frame received from the peer.
///
/// Pings from the peer are answered by the transport itself and never
/// surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame. The wire protocol is text-only, so callers usually
    /// answer this with a protocol error.
    Binary(Vec<u8>),
    /// A pong, i.e. proof that the peer is still alive.
    Pong,
}

/// The read half of a connection.
///
/// Methods return `impl Future + Send` so that generic callers can move
/// the half into a spawned task.
pub trait FrameReader: Send + 'static {
    /// Receives the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Inbound>, TransportError>> + Send;
}

/// The write half of a connection.
pub trait FrameWriter: Send + 'static {
    /// Sends one text frame.
    fn send_text(
        &mut self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a ping. The peer is expected to answer with a pong.
    fn send_ping(
        &mut self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends the close frame and flushes.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// An established connection that can be split into its two halves.
pub trait Connection: Send + 'static {
    /// The read half.
    type Reader: FrameReader;
    /// The write half.
    type Writer: FrameWriter;

    /// The remote address of the peer.
    fn peer_addr(&self) -> SocketAddr;

    /// Consumes the connection and returns its halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
