mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use stonelink::{Callbacks, IoModule, Packet};

use common::connection_pair;

/// A full outbound queue blocks the producer instead of dropping; closing
/// the queue releases it.
#[tokio::test]
async fn test_write_backpressure_blocks_producer() {
    // no writer task is draining this module, so the queue stays full
    let io = Arc::new(IoModule::new(2));

    io.write(Packet::with_id("m1", Bytes::from_static(b"x"))).await;
    io.write(Packet::with_id("m2", Bytes::from_static(b"x"))).await;

    let blocked = io.clone();
    let third = tokio::spawn(async move {
        blocked
            .write(Packet::with_id("m3", Bytes::from_static(b"x")))
            .await;
    });

    // the third write must still be parked once the queue holds two
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!third.is_finished(), "write into a full queue must block");

    // teardown closes the queue and unblocks the producer
    io.on_connection_lost();
    timeout(Duration::from_secs(1), third)
        .await
        .expect("blocked write must be released by teardown")
        .unwrap();

    // writes after teardown are silent no-ops
    timeout(
        Duration::from_millis(100),
        io.write(Packet::with_id("m4", Bytes::from_static(b"x"))),
    )
    .await
    .expect("write after close must not block");
}

/// Two concurrent awaits answered out of order each resolve with their own
/// response.
#[tokio::test]
async fn test_rpc_correlation_out_of_order_responses() {
    let requests = Arc::new(Mutex::new(Vec::<Packet>::new()));
    let server_requests = requests.clone();

    let server_callbacks = Callbacks::new().on_message(move |conn, packet| {
        let requests = server_requests.clone();
        async move {
            let mut held = requests.lock().await;
            held.push(packet);
            if held.len() == 2 {
                // answer the second request first
                for request in held.drain(..).rev() {
                    let mut reply = Packet::with_id(
                        request.id(),
                        format!("reply-{}", String::from_utf8_lossy(request.data()))
                            .into_bytes(),
                    );
                    reply.set_sequence(request.sequence());
                    conn.write_packet(reply).await;
                }
            }
        }
    });

    let (client, _server) = connection_pair(Callbacks::new(), server_callbacks, 64).await;

    let first_client = client.clone();
    let first = tokio::spawn(async move {
        first_client
            .write_packet_await(Packet::with_id("Call", Bytes::from_static(b"one")))
            .await
            .unwrap()
    });
    let second_client = client.clone();
    let second = tokio::spawn(async move {
        second_client
            .write_packet_await(Packet::with_id("Call", Bytes::from_static(b"two")))
            .await
            .unwrap()
    });

    let first = timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), second).await.unwrap().unwrap();

    assert_eq!(first.unwrap().data().as_ref(), b"reply-one");
    assert_eq!(second.unwrap().data().as_ref(), b"reply-two");
}

/// Force-closing a connection resolves every outstanding await with no
/// response instead of leaving callers blocked.
#[tokio::test]
async fn test_teardown_flushes_pending_awaits() {
    // the server never answers
    let (client, _server) = connection_pair(Callbacks::new(), Callbacks::new(), 64).await;

    let mut waiters = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        waiters.push(tokio::spawn(async move {
            client
                .write_packet_await(Packet::with_id("Void", format!("req-{}", i).into_bytes()))
                .await
                .unwrap()
        }));
    }

    // let the requests reach the wire before pulling the plug
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.close().await);

    for waiter in waiters {
        let response = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("await must resolve after teardown")
            .unwrap();
        assert!(response.is_none(), "flushed await must carry no response");
    }
}

/// The close sequence runs exactly once; later calls report already-closed.
#[tokio::test]
async fn test_close_is_idempotent() {
    let close_count = Arc::new(AtomicUsize::new(0));
    let counted = close_count.clone();
    let client_callbacks = Callbacks::new().on_close(move |_conn| {
        let counted = counted.clone();
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
        }
    });

    let (client, _server) = connection_pair(client_callbacks, Callbacks::new(), 64).await;

    assert!(client.close().await);
    assert!(!client.close().await);
    assert!(!client.close().await);
    assert_eq!(close_count.load(Ordering::SeqCst), 1);
    assert!(client.is_closed());
}

/// A write on a closed connection is a silent no-op and an await resolves
/// immediately with no response.
#[tokio::test]
async fn test_writes_after_close_are_noops() {
    let (client, _server) = connection_pair(Callbacks::new(), Callbacks::new(), 2).await;
    assert!(client.close().await);

    for _ in 0..10 {
        timeout(
            Duration::from_millis(200),
            client.write_packet(Packet::with_id("late", Bytes::from_static(b"x"))),
        )
        .await
        .expect("write on closed connection must return immediately");
    }

    let response = timeout(
        Duration::from_millis(200),
        client.write_packet_await(Packet::with_id("late", Bytes::from_static(b"x"))),
    )
    .await
    .expect("await on closed connection must return immediately")
    .unwrap();
    assert!(response.is_none());
}
