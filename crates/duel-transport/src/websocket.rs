//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::{Connection, FrameReader, FrameWriter, Inbound, TransportError};

type WsStream = WebSocketStream<TcpStream>;

/// Listens for TCP connections that will be upgraded to WebSocket.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The WebSocket handshake is *not* performed here: call
    /// [`PendingUpgrade::upgrade`] from the per-connection task so a slow
    /// client cannot stall the accept loop.
    pub async fn accept(&self) -> Result<PendingUpgrade, TransportError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer_addr, "accepted TCP connection");
        Ok(PendingUpgrade { stream, peer_addr })
    }
}

/// A TCP connection that has not completed the WebSocket handshake yet.
pub struct PendingUpgrade {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl PendingUpgrade {
    /// The remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Runs the WebSocket handshake.
    ///
    /// Frames and messages longer than `max_frame_bytes` are refused as
    /// soon as their header is read, before the payload is buffered, and
    /// reported as [`TransportError::FrameTooLarge`] by the reader.
    pub async fn upgrade(
        self,
        max_frame_bytes: usize,
    ) -> Result<WebSocketConnection, TransportError> {
        let config = WebSocketConfig::default()
            .max_message_size(Some(max_frame_bytes))
            .max_frame_size(Some(max_frame_bytes));
        let ws = tokio_tungstenite::accept_async_with_config(self.stream, Some(config))
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        tracing::debug!(peer_addr = %self.peer_addr, max_frame_bytes, "WebSocket handshake complete");
        Ok(WebSocketConnection {
            ws,
            peer_addr: self.peer_addr,
        })
    }
}

/// An upgraded WebSocket connection.
pub struct WebSocketConnection {
    ws: WsStream,
    peer_addr: SocketAddr,
}

impl Connection for WebSocketConnection {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn split(self) -> (WebSocketReader, WebSocketWriter) {
        let (sink, stream) = self.ws.split();
        (WebSocketReader { stream }, WebSocketWriter { sink })
    }
}

/// Read half of a [`WebSocketConnection`].
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Inbound::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Inbound::Binary(data.to_vec())));
                }
                Some(Ok(Message::Pong(_))) => return Ok(Some(Inbound::Pong)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Pings are answered by tungstenite on the next flush.
                Some(Ok(Message::Ping(_) | Message::Frame(_))) => continue,
                Some(Err(WsError::Capacity(CapacityError::MessageTooLong { size, max_size }))) => {
                    return Err(TransportError::FrameTooLarge {
                        size,
                        limit: max_size,
                    });
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }
}

/// Write half of a [`WebSocketConnection`].
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter for WebSocketWriter {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
