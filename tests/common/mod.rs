#![allow(dead_code)]

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use stonelink::{head_codec_factory, Callbacks, Connection, Transport};

/// Two started connections over a fresh localhost socket pair, both framed
/// with the head codec.
pub async fn connection_pair(
    client_callbacks: Callbacks,
    server_callbacks: Callbacks,
    max_queue_size: usize,
) -> (Arc<Connection>, Arc<Connection>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (server_stream, _) = accepted.unwrap();

    let client = Connection::new(
        Transport::tcp(connected.unwrap()).unwrap(),
        head_codec_factory(),
        client_callbacks,
        max_queue_size,
    );
    assert!(client.start().await);

    let server = Connection::new(
        Transport::tcp(server_stream).unwrap(),
        head_codec_factory(),
        server_callbacks,
        max_queue_size,
    );
    assert!(server.start().await);

    (client, server)
}
