use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};

use stonelink::{
    head_codec_factory, ws_codec_factory, Callbacks, Client, Packet, TcpServer, WsServer,
};

const QUEUE_SIZE: usize = 64;
const MAX_PACKET_SIZE: usize = 1024 * 1024;

fn echo_callbacks() -> Callbacks {
    Callbacks::new().on_message(|conn, packet| async move {
        let mut reply = Packet::with_id(packet.id(), packet.data().clone());
        reply.set_session_id(packet.session_id());
        reply.set_sequence(packet.sequence());
        reply.set_status(0);
        conn.write_packet(reply).await;
    })
}

async fn start_tcp_server(callbacks: Callbacks, max_conn: usize) -> (Arc<TcpServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (notify_shutdown, _) = broadcast::channel(1);
    let server = Arc::new(TcpServer::new(
        listener,
        "test-server",
        max_conn,
        head_codec_factory(),
        callbacks,
        QUEUE_SIZE,
        notify_shutdown,
    ));
    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve().await.unwrap();
    });
    (server, addr)
}

/// End-to-end ping over the head codec: the echoed packet reaches the
/// client's message callback with the same payload and status 0.
#[tokio::test]
async fn test_tcp_echo_end_to_end() {
    let (_server, addr) = start_tcp_server(echo_callbacks(), 16).await;

    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    let client_callbacks = Callbacks::new().on_message(move |_conn, packet| {
        let received_tx = received_tx.clone();
        async move {
            let _ = received_tx.send(packet);
        }
    });

    let client = Client::tcp(
        "echo-client",
        addr,
        head_codec_factory(),
        client_callbacks,
        QUEUE_SIZE,
    );
    let conn = timeout(Duration::from_secs(5), client.connect())
        .await
        .unwrap()
        .expect("client must connect");

    conn.write_packet(Packet::with_id("Ping", Bytes::from_static(b"{}"))).await;

    let echoed = timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed.id(), "Ping");
    assert_eq!(echoed.data().as_ref(), b"{}");
    assert_eq!(echoed.status(), 0);

    client.close().await;
}

/// Fire-and-forget writes are flushed and delivered in submission order.
#[tokio::test]
async fn test_tcp_fire_and_forget_order() {
    let (_server, addr) = start_tcp_server(echo_callbacks(), 16).await;

    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    let client_callbacks = Callbacks::new().on_message(move |_conn, packet| {
        let received_tx = received_tx.clone();
        async move {
            let _ = received_tx.send(packet);
        }
    });

    let client = Client::tcp(
        "order-client",
        addr,
        head_codec_factory(),
        client_callbacks,
        QUEUE_SIZE,
    );
    let conn = client.connect().await.expect("client must connect");

    for tag in 0..20u64 {
        conn.write_packet(Packet::with_id("Seq", tag.to_string().into_bytes())).await;
    }

    for expected in 0..20u64 {
        let echoed = timeout(Duration::from_secs(5), received_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let tag: u64 = String::from_utf8_lossy(echoed.data()).parse().unwrap();
        assert_eq!(tag, expected);
    }

    client.close().await;
}

/// write_await round-trips through a real server: the echoed sequence
/// satisfies the pending call instead of the message callback.
#[tokio::test]
async fn test_tcp_await_through_server() {
    let (_server, addr) = start_tcp_server(echo_callbacks(), 16).await;

    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    let client_callbacks = Callbacks::new().on_message(move |_conn, packet| {
        let received_tx = received_tx.clone();
        async move {
            let _ = received_tx.send(packet);
        }
    });

    let client = Client::tcp(
        "await-client",
        addr,
        head_codec_factory(),
        client_callbacks,
        QUEUE_SIZE,
    );
    client.connect().await.expect("client must connect");

    let response = timeout(
        Duration::from_secs(5),
        client.send_packet_await(Packet::with_id("Sum", Bytes::from_static(b"1+1"))),
    )
    .await
    .unwrap()
    .unwrap()
    .expect("echoed response must resolve the await");
    assert_eq!(response.data().as_ref(), b"1+1");

    // the correlated response must not leak into the message callback
    assert!(
        timeout(Duration::from_millis(200), received_rx.recv())
            .await
            .is_err(),
        "response was delivered twice"
    );

    client.close().await;
}

/// While the authorized callback is installed, the handshake packet is
/// consumed by it and only later packets reach the message callback.
#[tokio::test]
async fn test_auth_gate_consumes_first_packet() {
    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    let server_callbacks = Callbacks::new()
        .on_authorized(|_conn, packet| async move { packet.data().as_ref() == b"secret" })
        .on_message(move |_conn, packet| {
            let received_tx = received_tx.clone();
            async move {
                let _ = received_tx.send(packet);
            }
        });
    let (_server, addr) = start_tcp_server(server_callbacks, 16).await;

    let client = Client::tcp(
        "auth-client",
        addr,
        head_codec_factory(),
        Callbacks::new(),
        QUEUE_SIZE,
    );
    let conn = client.connect().await.expect("client must connect");

    conn.write_packet(Packet::with_id("Auth", Bytes::from_static(b"secret"))).await;
    conn.write_packet(Packet::with_id("Chat", Bytes::from_static(b"hello"))).await;

    let first = timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id(), "Chat");
    assert_eq!(first.data().as_ref(), b"hello");

    client.close().await;
}

/// Sockets beyond the connection cap are dropped immediately; the client
/// observes the disconnect.
#[tokio::test]
async fn test_connection_cap_rejects_excess_sockets() {
    let (server, addr) = start_tcp_server(echo_callbacks(), 1).await;

    let first = Client::tcp(
        "first",
        addr.clone(),
        head_codec_factory(),
        Callbacks::new(),
        QUEUE_SIZE,
    );
    let first_conn = first.connect().await.expect("first client must connect");
    // a full round trip guarantees the server registered the connection
    let pong = timeout(
        Duration::from_secs(5),
        first_conn.write_packet_await(Packet::with_id("Ping", Bytes::from_static(b"{}"))),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(pong.is_some());
    assert_eq!(server.conn_mgr().conn_count(), 1);

    let second = Client::tcp(
        "second",
        addr,
        head_codec_factory(),
        Callbacks::new(),
        QUEUE_SIZE,
    );
    let second_conn = second.connect().await.expect("tcp connect itself succeeds");

    // the server drops the socket without wiring a connection
    timeout(Duration::from_secs(5), async {
        while !second_conn.is_closed() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("rejected socket must observe the disconnect");
    assert_eq!(server.conn_mgr().conn_count(), 1);

    second.close().await;
    first.close().await;
}

/// WebSocket echo: one message in, one message back, through the WS codec.
#[tokio::test]
async fn test_ws_echo_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (notify_shutdown, _) = broadcast::channel(1);

    let server_callbacks = Callbacks::new().on_message(|conn, packet| async move {
        conn.write_data(packet.data().clone()).await;
    });
    let server = Arc::new(WsServer::new(
        listener,
        "ws-test-server",
        16,
        MAX_PACKET_SIZE,
        ws_codec_factory(),
        server_callbacks,
        QUEUE_SIZE,
        notify_shutdown,
    ));
    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve().await.unwrap();
    });

    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    let client_callbacks = Callbacks::new().on_message(move |_conn, packet| {
        let received_tx = received_tx.clone();
        async move {
            let _ = received_tx.send(packet);
        }
    });

    let client = Client::websocket(
        "ws-client",
        format!("ws://{}/", addr),
        ws_codec_factory(),
        client_callbacks,
        QUEUE_SIZE,
    );
    let conn = timeout(Duration::from_secs(5), client.connect())
        .await
        .unwrap()
        .expect("ws client must connect");

    conn.write_data(Bytes::from_static(b"hello over ws")).await;

    let echoed = timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed.data().as_ref(), b"hello over ws");

    client.close().await;
}

/// A dial that keeps failing past the hard timeout resolves the connect
/// call with nothing instead of retrying forever.
#[tokio::test]
async fn test_dial_timeout_cancels_connect() {
    // grab a port nobody is listening on anymore
    let vacant = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = vacant.local_addr().unwrap().to_string();
    drop(vacant);

    let mut client = Client::tcp(
        "doomed-client",
        addr,
        head_codec_factory(),
        Callbacks::new(),
        QUEUE_SIZE,
    );
    client.set_timeout(Duration::from_secs(1));

    let connected = timeout(Duration::from_secs(10), client.connect())
        .await
        .expect("dial timeout must cancel the connect");
    assert!(connected.is_none());
    assert!(client.conn().is_none());
}

/// The retry signal: a client whose connection drops while retry holds
/// dials again; after close() no reconnect happens.
#[tokio::test]
async fn test_client_reconnects_until_closed() {
    let (connects_tx, mut connects_rx) = mpsc::unbounded_channel();
    let client_callbacks = Callbacks::new().on_conn(move |conn| {
        let connects_tx = connects_tx.clone();
        async move {
            if !conn.is_closed() {
                let _ = connects_tx.send(conn.id().to_string());
            }
        }
    });

    let (server, addr) = start_tcp_server(echo_callbacks(), 16).await;

    let client = Client::tcp(
        "retry-client",
        addr,
        head_codec_factory(),
        client_callbacks,
        QUEUE_SIZE,
    );
    let first_conn = client.connect().await.expect("client must connect");
    let first_id = timeout(Duration::from_secs(5), connects_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_id, first_conn.id());

    // server-side close tears the socket down; the connector dials again
    server.conn_mgr().clean().await;
    let second_id = timeout(Duration::from_secs(10), connects_rx.recv())
        .await
        .expect("client must reconnect after a remote drop")
        .unwrap();
    assert_ne!(second_id, first_id);

    // intentional close: retry is cleared first, so no further dial
    client.close().await;
    assert!(
        timeout(Duration::from_secs(2), connects_rx.recv())
            .await
            .is_err(),
        "client must not reconnect after an intentional close"
    );
}
