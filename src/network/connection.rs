use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{error, trace};
use uuid::Uuid;

use crate::network::transport::Transport;
use crate::network::{Callbacks, IoModule};
use crate::protocol::{Codec, CodecFactory, Packet, TransportKind};
use crate::AppResult;

/// Owner of one socket.
///
/// A connection carries a process-unique id, its codec (through the
/// `IoModule`), and a small context map for per-connection user state. It is
/// the only component with close state: `close` is idempotent and only the
/// first call runs the close sequence. Callers must not retain the
/// connection after `close` returns.
pub struct Connection {
    conn_id: String,
    kind: TransportKind,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    io: IoModule,
    transport: Mutex<Option<Transport>>,
    codec_factory: CodecFactory,
    callbacks: Callbacks,
    is_closed: AtomicBool,
    is_authorized: AtomicBool,
    context: DashMap<String, Arc<dyn Any + Send + Sync>>,
    me: Weak<Connection>,
}

impl Connection {
    pub fn new(
        transport: Transport,
        codec_factory: CodecFactory,
        callbacks: Callbacks,
        max_queue_size: usize,
    ) -> Arc<Connection> {
        Arc::new_cyclic(|me| Connection {
            conn_id: Uuid::new_v4().to_string(),
            kind: transport.kind(),
            local_addr: transport.local_addr(),
            peer_addr: transport.peer_addr(),
            io: IoModule::new(max_queue_size),
            transport: Mutex::new(Some(transport)),
            codec_factory,
            callbacks,
            is_closed: AtomicBool::new(false),
            is_authorized: AtomicBool::new(false),
            context: DashMap::new(),
            me: me.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.conn_id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    /// Wires a fresh codec from the factory into the I/O module, starts the
    /// reader/writer tasks, and fires the conn callback.
    pub async fn start(&self) -> bool {
        let transport = self.transport.lock().take();
        let Some(transport) = transport else {
            error!("connection {} started twice", self.conn_id);
            return false;
        };

        let codec = (self.codec_factory)();
        if !self.io.update_codec(codec, self.kind) {
            error!("io module codec error");
            return false;
        }
        self.io.start(self.me.clone(), transport);
        self.on_connection().await;
        true
    }

    /// Idempotent close: only the 0 -> 1 transition invokes the close
    /// callback, tears down the I/O module, and releases the socket. Later
    /// calls return false.
    pub async fn close(&self) -> bool {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            trace!("connection {} was closed", self.conn_id);
            return false;
        }

        if let Some(close) = &self.callbacks.close {
            if let Some(conn) = self.me.upgrade() {
                close(conn).await;
            }
        }

        self.io.on_connection_lost();
        true
    }

    /// Hot-swaps the codec, e.g. after an in-band handshake changed framing.
    pub fn update_codec(&self, codec: Box<dyn Codec>) -> bool {
        self.io.update_codec(codec, self.kind)
    }

    /// Fires the conn callback. Invoked on start and again from the server
    /// and client close paths, distinguishable via `is_closed`.
    pub async fn on_connection(&self) {
        if let Some(conn_cb) = &self.callbacks.conn {
            if let Some(conn) = self.me.upgrade() {
                conn_cb(conn).await;
            }
        }
    }

    /// Entry point for decoded inbound packets from the reader task.
    ///
    /// While an authorized callback is configured and the connection is not
    /// yet authorized, the packet is routed there instead; the callback's
    /// result becomes the new authorized flag, so exactly one packet
    /// performs the handshake.
    pub async fn read_packet(&self, packet: Packet) {
        let Some(conn) = self.me.upgrade() else {
            return;
        };
        if let Some(authorized) = &self.callbacks.authorized {
            if !self.is_authorized.load(Ordering::Acquire) {
                let granted = authorized(conn, packet).await;
                self.is_authorized.store(granted, Ordering::Release);
                return;
            }
        }
        if let Some(message) = &self.callbacks.message {
            message(conn, packet).await;
        }
    }

    pub(crate) async fn write_complete(&self) {
        if let Some(write_complete) = &self.callbacks.write_complete {
            if let Some(conn) = self.me.upgrade() {
                write_complete(conn).await;
            }
        }
    }

    async fn write(&self, packet: Packet, wait: bool) -> AppResult<Option<Packet>> {
        if self.is_closed() {
            return Ok(None);
        }
        if wait {
            return self.io.write_await(packet).await;
        }
        self.io.write(packet).await;
        Ok(None)
    }

    fn name_packet(id: &str, data: Bytes) -> Packet {
        let mut packet = Packet::new();
        packet.set_id(id);
        packet.set_data(data);
        packet
    }

    pub async fn write_packet(&self, packet: Packet) {
        let _ = self.write(packet, false).await;
    }

    pub async fn write_data(&self, data: Bytes) {
        self.write_data_by_id("", data).await;
    }

    pub async fn write_data_by_id(&self, id: &str, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let _ = self.write(Self::name_packet(id, data), false).await;
    }

    pub async fn write_packet_await(&self, packet: Packet) -> AppResult<Option<Packet>> {
        self.write(packet, true).await
    }

    pub async fn write_data_await(&self, data: Bytes) -> AppResult<Option<Packet>> {
        self.write_data_by_id_await("", data).await
    }

    pub async fn write_data_by_id_await(
        &self,
        id: &str,
        data: Bytes,
    ) -> AppResult<Option<Packet>> {
        if data.is_empty() {
            return Ok(None);
        }
        self.write(Self::name_packet(id, data), true).await
    }

    /// Attaches arbitrary typed user state to the connection, keyed by name.
    pub fn set_context<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.context.insert(key.to_string(), Arc::new(value));
    }

    pub fn get_context<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.context.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn del_context(&self, key: &str) {
        self.context.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::head_codec_factory;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_connection() -> Arc<Connection> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, _server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let transport = Transport::tcp(client.unwrap()).unwrap();
        Connection::new(transport, head_codec_factory(), Callbacks::new(), 16)
    }

    #[tokio::test]
    async fn test_context_round_trip() {
        let conn = test_connection().await;
        conn.set_context("attempts", 3u32);
        assert_eq!(conn.get_context::<u32>("attempts").as_deref(), Some(&3));
        // type mismatch yields nothing
        assert!(conn.get_context::<String>("attempts").is_none());
        conn.del_context("attempts");
        assert!(conn.get_context::<u32>("attempts").is_none());
    }

    #[tokio::test]
    async fn test_close_before_start_is_idempotent() {
        let conn = test_connection().await;
        assert!(!conn.is_closed());
        assert!(conn.close().await);
        assert!(conn.is_closed());
        assert!(!conn.close().await);
    }
}
