//! Per-connection handler: upgrade, registration, the two pumps, and
//! message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. WebSocket upgrade with the configured frame-size limit
//!   2. Register with the Manager → unique display name, `connection_ready`
//!   3. Spawn the writer pump (outbound queue + pings)
//!   4. Read loop in this task: decode envelopes → dispatch to the Manager
//!   5. Teardown once either pump stops

use std::sync::Arc;
use std::time::Duration;

use duel_protocol::{
    ClientMessage, Codec, Envelope, JsonCodec, ProtocolError, ServerMessage,
};
use duel_room::Manager;
use duel_session::{Client, OutboundReceiver};
use duel_store::Store;
use duel_transport::{Connection, FrameReader, FrameWriter, Inbound, PendingUpgrade};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout, timeout_at};

use crate::DuelError;
use crate::config::ServerConfig;

/// Timing and size limits for one connection's pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PumpSettings {
    pub(crate) max_frame_bytes: usize,
    pub(crate) ping_interval: Duration,
    pub(crate) pong_wait: Duration,
    pub(crate) write_wait: Duration,
}

impl From<&ServerConfig> for PumpSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_frame_bytes: config.limits.max_frame_bytes,
            ping_interval: config.heartbeat.ping_interval(),
            pong_wait: config.heartbeat.pong_wait(),
            write_wait: config.heartbeat.write_wait(),
        }
    }
}

/// Why the read loop stopped.
#[derive(Debug, PartialEq, Eq)]
enum ReadExit {
    /// The peer closed, the read failed, or the pong deadline passed.
    Reader,
    /// The writer pump already finished.
    Writer,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S: Store>(
    pending: PendingUpgrade,
    manager: Arc<Manager<S>>,
    settings: PumpSettings,
) -> Result<(), DuelError> {
    let peer_addr = pending.peer_addr();
    let conn = pending.upgrade(settings.max_frame_bytes).await?;
    let (mut reader, mut writer) = conn.split();

    let (client, outbound) = match manager.register_connection().await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(%peer_addr, error = %e, "rejecting connection");
            let reply = JsonCodec.encode(&ServerMessage::error(e.client_message()))?;
            let _ = timeout(settings.write_wait, writer.send_text(&reply)).await;
            let _ = timeout(settings.write_wait, writer.close()).await;
            return Err(e.into());
        }
    };
    tracing::debug!(conn_id = %client.id(), %peer_addr, "connection accepted");

    let mut write_task = tokio::spawn(write_pump(writer, outbound, settings));
    let exit = read_pump(&mut reader, &client, &manager, settings, &mut write_task).await;

    // Closes the outbound queue, which lets the writer send Close and stop.
    manager.teardown_connection(&client).await;
    if exit == ReadExit::Reader {
        let _ = write_task.await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pumps
// ---------------------------------------------------------------------------

/// Reads frames until the peer goes away or the writer stops.
///
/// The read deadline starts at `pong_wait` and moves forward only when a
/// pong arrives.
async fn read_pump<R: FrameReader, S: Store>(
    reader: &mut R,
    client: &Arc<Client>,
    manager: &Manager<S>,
    settings: PumpSettings,
    write_task: &mut JoinHandle<()>,
) -> ReadExit {
    let conn_id = client.id();
    let mut deadline = Instant::now() + settings.pong_wait;

    loop {
        let frame = tokio::select! {
            read = timeout_at(deadline, reader.recv()) => read,
            _ = &mut *write_task => {
                tracing::debug!(%conn_id, "writer stopped");
                return ReadExit::Writer;
            }
        };

        match frame {
            Ok(Ok(Some(Inbound::Text(text)))) => dispatch(manager, client, &text).await,
            Ok(Ok(Some(Inbound::Binary(_)))) => {
                client.send_error(ProtocolError::BinaryFrame.client_message());
            }
            Ok(Ok(Some(Inbound::Pong))) => {
                deadline = Instant::now() + settings.pong_wait;
            }
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                return ReadExit::Reader;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "read failed");
                return ReadExit::Reader;
            }
            Err(_) => {
                tracing::info!(%conn_id, "no pong before deadline, closing");
                return ReadExit::Reader;
            }
        }
    }
}

/// Drains the outbound queue to the socket and sends periodic pings.
///
/// Sends Close and returns once the queue is closed; returns early on any
/// failed or timed-out write.
async fn write_pump<W: FrameWriter>(
    mut writer: W,
    mut outbound: OutboundReceiver,
    settings: PumpSettings,
) {
    let mut ping = interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = timeout(settings.write_wait, writer.close()).await;
                    return;
                };
                match timeout(settings.write_wait, writer.send_text(&frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "write failed");
                        return;
                    }
                    Err(_) => {
                        tracing::debug!("write timed out");
                        return;
                    }
                }
            }
            _ = ping.tick() => {
                if !matches!(timeout(settings.write_wait, writer.send_ping()).await, Ok(Ok(()))) {
                    tracing::debug!("ping failed");
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Decodes one text frame and routes it to the Manager.
///
/// Every failure is answered with an `error` message to the sender only;
/// the connection stays open.
async fn dispatch<S: Store>(manager: &Manager<S>, client: &Arc<Client>, text: &str) {
    let msg = match JsonCodec
        .decode::<Envelope>(text)
        .and_then(ClientMessage::try_from)
    {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(conn_id = %client.id(), error = %e, "bad frame");
            client.send_error(e.client_message());
            return;
        }
    };

    let result = match msg {
        ClientMessage::JoinRoom { room_id } => manager.join_room(client, room_id).await.map(drop),
        ClientMessage::MakeMove(mv) => manager.make_move(client, &mv).await,
        ClientMessage::RematchRequest => manager.request_rematch(client).await,
        ClientMessage::ChatMessage { message } => manager.send_chat(client, &message).await,
        ClientMessage::UpdateDisplayName { display_name } => {
            manager.rename_connection(client, &display_name).await
        }
    };

    if let Err(e) = result {
        tracing::debug!(conn_id = %client.id(), error = %e, "request rejected");
        client.send_error(e.client_message());
    }
}

#[cfg(test)]
mod tests {
    use duel_room::{GameRegistry, ManagerConfig};
    use duel_store::MemoryStore;
    use duel_transport::TransportError;
    use tokio::sync::mpsc;

    use super::*;

    const SETTINGS: PumpSettings = PumpSettings {
        max_frame_bytes: 4096,
        ping_interval: Duration::from_secs(54),
        pong_wait: Duration::from_secs(60),
        write_wait: Duration::from_secs(10),
    };

    #[derive(Debug, PartialEq, Eq)]
    enum Written {
        Text(String),
        Ping,
        Close,
    }

    /// Records everything written; a stalled writer never completes a
    /// text write.
    struct FakeWriter {
        written: mpsc::UnboundedSender<Written>,
        stalled: bool,
    }

    impl FrameWriter for FakeWriter {
        async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            if self.stalled {
                std::future::pending::<()>().await;
            }
            let _ = self.written.send(Written::Text(text.to_owned()));
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<(), TransportError> {
            let _ = self.written.send(Written::Ping);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            let _ = self.written.send(Written::Close);
            Ok(())
        }
    }

    /// Yields whatever the test pushes; dropping the sender closes it.
    struct FakeReader {
        inbound: mpsc::UnboundedReceiver<Inbound>,
    }

    impl FrameReader for FakeReader {
        async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
            Ok(self.inbound.recv().await)
        }
    }

    fn writer(stalled: bool) -> (FakeWriter, mpsc::UnboundedReceiver<Written>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FakeWriter { written: tx, stalled }, rx)
    }

    fn reader() -> (FakeReader, mpsc::UnboundedSender<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FakeReader { inbound: rx }, tx)
    }

    async fn registered() -> (Arc<Manager<MemoryStore>>, Arc<Client>, OutboundReceiver) {
        let manager = Arc::new(Manager::new(
            Arc::new(MemoryStore::new()),
            GameRegistry::new(),
            ManagerConfig::default(),
        ));
        let (client, outbound) = manager.register_connection().await.expect("register");
        (manager, client, outbound)
    }

    fn idle_writer_task() -> JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    // -----------------------------------------------------------------
    // Writer
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_writer_pings_every_interval() {
        let (w, mut written) = writer(false);
        let (_queue, outbound) = mpsc::channel(8);
        let task = tokio::spawn(write_pump(w, outbound, SETTINGS));

        let start = Instant::now();
        assert_eq!(written.recv().await, Some(Written::Ping));
        assert_eq!(start.elapsed(), SETTINGS.ping_interval);
        assert_eq!(written.recv().await, Some(Written::Ping));
        assert_eq!(start.elapsed(), SETTINGS.ping_interval * 2);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_drains_queue_then_closes() {
        let (w, mut written) = writer(false);
        let (queue, outbound) = mpsc::channel(8);
        let task = tokio::spawn(write_pump(w, outbound, SETTINGS));

        queue.send(Arc::from("hello")).await.expect("queued");
        assert_eq!(written.recv().await, Some(Written::Text("hello".into())));

        drop(queue);
        assert_eq!(written.recv().await, Some(Written::Close));
        task.await.expect("writer finished");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_stops_writer_after_write_wait() {
        let (w, _written) = writer(true);
        let (queue, outbound) = mpsc::channel(8);
        let task = tokio::spawn(write_pump(w, outbound, SETTINGS));

        let start = Instant::now();
        queue.send(Arc::from("stuck")).await.expect("queued");
        task.await.expect("writer finished");
        assert_eq!(start.elapsed(), SETTINGS.write_wait);
    }

    // -----------------------------------------------------------------
    // Reader
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_dropped_after_pong_wait() {
        let (manager, client, _outbound) = registered().await;
        let (mut r, _inbound) = reader();
        let mut write_task = idle_writer_task();

        let start = Instant::now();
        let exit = read_pump(&mut r, &client, &manager, SETTINGS, &mut write_task).await;
        assert_eq!(exit, ReadExit::Reader);
        assert_eq!(start.elapsed(), SETTINGS.pong_wait);
        write_task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_moves_the_read_deadline() {
        let (manager, client, _outbound) = registered().await;
        let (mut r, inbound) = reader();
        let mut write_task = idle_writer_task();

        let peer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(50)).await;
            let _ = inbound.send(Inbound::Pong);
            tokio::time::sleep(Duration::from_secs(50)).await;
            let _ = inbound.send(Inbound::Pong);
            let _keep_open = inbound;
            std::future::pending::<()>().await;
        });

        let start = Instant::now();
        let exit = read_pump(&mut r, &client, &manager, SETTINGS, &mut write_task).await;
        assert_eq!(exit, ReadExit::Reader);
        assert_eq!(start.elapsed(), Duration::from_secs(100) + SETTINGS.pong_wait);
        peer.abort();
        write_task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_stops_when_writer_stops() {
        let (manager, client, _outbound) = registered().await;
        let (mut r, _inbound) = reader();
        let mut write_task = tokio::spawn(async {});

        let exit = read_pump(&mut r, &client, &manager, SETTINGS, &mut write_task).await;
        assert_eq!(exit, ReadExit::Writer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_binary_frame_gets_error_and_keeps_reading() {
        let (manager, client, mut outbound) = registered().await;
        let (mut r, inbound) = reader();
        let mut write_task = idle_writer_task();
        while outbound.try_recv().is_ok() {}

        inbound.send(Inbound::Binary(vec![1, 2, 3])).expect("queued");
        inbound.send(Inbound::Text("not json".into())).expect("queued");
        drop(inbound);
        let exit = read_pump(&mut r, &client, &manager, SETTINGS, &mut write_task).await;
        assert_eq!(exit, ReadExit::Reader);

        let replies: Vec<ServerMessage> = std::iter::from_fn(|| outbound.try_recv().ok())
            .map(|frame| serde_json::from_str(&frame).expect("server message"))
            .collect();
        assert_eq!(
            replies,
            vec![
                ServerMessage::error("Invalid message format."),
                ServerMessage::error("Invalid message format."),
            ]
        );
        write_task.abort();
    }
}
