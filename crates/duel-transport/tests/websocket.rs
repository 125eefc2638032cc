//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use duel_transport::{
        Connection, FrameReader, FrameWriter, Inbound, TransportError,
        WebSocketConnection, WebSocketTransport,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a transport, connects one client, and returns both ends.
    async fn connected_pair(max_frame_bytes: usize) -> (WebSocketConnection, ClientWs) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let pending = transport.accept().await.expect("should accept");
            pending.upgrade(max_frame_bytes).await.expect("should upgrade")
        });

        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let conn = server.await.expect("task should complete");
        (conn, client)
    }

    #[tokio::test]
    async fn test_text_frames_flow_both_ways() {
        let (conn, mut client) = connected_pair(1024).await;
        let (mut reader, mut writer) = conn.split();

        client
            .send(Message::Text("hello server".into()))
            .await
            .expect("client send");
        let frame = reader.recv().await.expect("recv").expect("frame");
        assert_eq!(frame, Inbound::Text("hello server".into()));

        writer.send_text("hello client").await.expect("server send");
        let msg = client.next().await.expect("some").expect("ok");
        assert_eq!(msg.into_text().expect("text").as_str(), "hello client");
    }

    #[tokio::test]
    async fn test_ping_reaches_client() {
        let (conn, mut client) = connected_pair(1024).await;
        let (_reader, mut writer) = conn.split();

        writer.send_ping().await.expect("ping");
        let msg = client.next().await.expect("some").expect("ok");
        assert!(matches!(msg, Message::Ping(_)), "got {msg:?}");
    }

    #[tokio::test]
    async fn test_pong_surfaces_as_inbound_pong() {
        let (conn, mut client) = connected_pair(1024).await;
        let (mut reader, _writer) = conn.split();

        client
            .send(Message::Pong(Vec::new().into()))
            .await
            .expect("client pong");
        let frame = reader.recv().await.expect("recv").expect("frame");
        assert_eq!(frame, Inbound::Pong);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_an_error() {
        let (conn, mut client) = connected_pair(16).await;
        let (mut reader, _writer) = conn.split();

        client
            .send(Message::Text("x".repeat(17).into()))
            .await
            .expect("client send");
        let err = reader.recv().await.expect_err("should reject");
        assert!(matches!(
            err,
            TransportError::FrameTooLarge { size: 17, limit: 16 }
        ));
    }

    #[tokio::test]
    async fn test_huge_frame_is_refused_from_its_header() {
        let (conn, mut client) = connected_pair(4096).await;
        let (mut reader, _writer) = conn.split();

        // The server never reads the payload, so the client may block
        // once the socket buffers fill.
        let sender = tokio::spawn(async move {
            let _ = client.send(Message::Text("x".repeat(8 << 20).into())).await;
            client
        });
        let err = reader.recv().await.expect_err("should reject");
        assert!(
            matches!(err, TransportError::FrameTooLarge { size, limit: 4096 } if size == 8 << 20),
            "got {err:?}"
        );
        sender.abort();
    }

    #[tokio::test]
    async fn test_client_close_yields_none() {
        let (conn, mut client) = connected_pair(1024).await;
        let (mut reader, _writer) = conn.split();

        client.close(None).await.expect("client close");
        let frame = reader.recv().await.expect("recv");
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_server_close_reaches_client() {
        let (conn, mut client) = connected_pair(1024).await;
        let (_reader, mut writer) = conn.split();

        writer.close().await.expect("close");
        let msg = client.next().await.expect("some").expect("ok");
        assert!(matches!(msg, Message::Close(_)), "got {msg:?}");
    }
}
