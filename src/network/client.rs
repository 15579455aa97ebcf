use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, trace};

use crate::network::connector::{CancelCallback, Connector, DialCallback, TransportCallback};
use crate::network::transport::Transport;
use crate::network::{Callbacks, Connection};
use crate::protocol::{CodecFactory, Packet};
use crate::{AppError, AppResult};

/// Outbound client over either transport.
///
/// `connect` starts the connector loop and waits for the first connection
/// (or for the dial timeout to cancel it). When the live connection closes
/// while `retry` still holds, the connector dials again and the conn
/// callback fires for the replacement; `close` clears the retry flag first
/// so an intentional shutdown never races a reconnect.
pub struct Client {
    name: String,
    connector: Arc<Connector>,
    timeout: Duration,
    conn: Arc<Mutex<Option<Arc<Connection>>>>,
    retry: Arc<AtomicBool>,
    codec_factory: CodecFactory,
    callbacks: Callbacks,
    max_queue_size: usize,
    dial: DialCallback,
    connected_tx: mpsc::Sender<Option<Arc<Connection>>>,
    connected_rx: tokio::sync::Mutex<mpsc::Receiver<Option<Arc<Connection>>>>,
}

impl Client {
    /// Plain TCP client dialing `addr` (host:port).
    pub fn tcp(
        name: impl Into<String>,
        addr: impl Into<String>,
        codec_factory: CodecFactory,
        callbacks: Callbacks,
        max_queue_size: usize,
    ) -> Client {
        let addr = addr.into();
        let dial_addr = addr.clone();
        let dial: DialCallback = Arc::new(move || {
            let addr = dial_addr.clone();
            Box::pin(async move { Transport::tcp(TcpStream::connect(&addr).await?) })
        });
        Self::with_dial(name, addr, dial, codec_factory, callbacks, max_queue_size)
    }

    /// WebSocket client dialing `url` (ws://host:port/path).
    pub fn websocket(
        name: impl Into<String>,
        url: impl Into<String>,
        codec_factory: CodecFactory,
        callbacks: Callbacks,
        max_queue_size: usize,
    ) -> Client {
        let url = url.into();
        let dial_url = url.clone();
        let dial: DialCallback = Arc::new(move || {
            let url = dial_url.clone();
            Box::pin(async move {
                let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
                    .await
                    .map_err(|e| {
                        AppError::DetailedIoError(format!("websocket dial error: {}", e))
                    })?;
                Transport::websocket(stream)
            })
        });
        Self::with_dial(name, url, dial, codec_factory, callbacks, max_queue_size)
    }

    fn with_dial(
        name: impl Into<String>,
        addr: String,
        dial: DialCallback,
        codec_factory: CodecFactory,
        callbacks: Callbacks,
        max_queue_size: usize,
    ) -> Client {
        let (connected_tx, connected_rx) = mpsc::channel(1);
        Client {
            name: name.into(),
            connector: Arc::new(Connector::new(addr)),
            timeout: Duration::ZERO,
            conn: Arc::new(Mutex::new(None)),
            retry: Arc::new(AtomicBool::new(true)),
            codec_factory,
            callbacks,
            max_queue_size,
            dial,
            connected_tx,
            connected_rx: tokio::sync::Mutex::new(connected_rx),
        }
    }

    /// Dial timeout; zero (the default) retries forever.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_working(&self) -> bool {
        self.connector.is_working()
    }

    pub fn conn(&self) -> Option<Arc<Connection>> {
        self.conn.lock().clone()
    }

    /// Starts the connector loop (if not already running) and waits for the
    /// first established connection. Returns `None` when the dial timed out.
    pub async fn connect(&self) -> Option<Arc<Connection>> {
        if self.connector.is_working() {
            return self.conn();
        }

        let connector = self.connector.clone();
        let timeout = self.timeout;
        let dial = self.dial.clone();
        let conn_callback = self.transport_callback();
        let cancel_callback = self.cancel_callback();
        tokio::spawn(async move {
            connector
                .run(timeout, dial, conn_callback, Some(cancel_callback))
                .await;
        });

        self.connected_rx.lock().await.recv().await.flatten()
    }

    /// Wires each freshly dialed transport into a connection whose close
    /// callback reports back to the connector with the current retry flag.
    fn transport_callback(&self) -> TransportCallback {
        let conn_slot = self.conn.clone();
        let retry = self.retry.clone();
        let connector = self.connector.clone();
        let codec_factory = self.codec_factory.clone();
        let callbacks = self.callbacks.clone();
        let connected_tx = self.connected_tx.clone();
        let max_queue_size = self.max_queue_size;

        Arc::new(move |transport: Transport| {
            let conn_slot = conn_slot.clone();
            let retry = retry.clone();
            let connector = connector.clone();
            let codec_factory = codec_factory.clone();
            let mut callbacks = callbacks.clone();
            let connected_tx = connected_tx.clone();

            Box::pin(async move {
                let close_retry = retry.clone();
                let close_connector = connector.clone();
                callbacks.close = Some(Arc::new(move |conn: Arc<Connection>| {
                    let connector = close_connector.clone();
                    let retry = close_retry.clone();
                    Box::pin(async move {
                        trace!("close connection: {}", conn.id());
                        conn.on_connection().await;
                        connector.close(retry.load(Ordering::Acquire)).await;
                    })
                }));

                let conn = Connection::new(transport, codec_factory, callbacks, max_queue_size);
                if !conn.start().await {
                    error!("new client connection start failed");
                    return;
                }
                *conn_slot.lock() = Some(conn.clone());
                // only the initial connect call is waiting on this
                let _ = connected_tx.try_send(Some(conn));
            })
        })
    }

    fn cancel_callback(&self) -> CancelCallback {
        let connected_tx = self.connected_tx.clone();
        Arc::new(move || {
            let connected_tx = connected_tx.clone();
            Box::pin(async move {
                let _ = connected_tx.try_send(None);
            })
        })
    }

    /// Clears the retry flag, then closes the live connection; the
    /// connector loop exits instead of reconnecting.
    pub async fn close(&self) -> bool {
        self.retry.store(false, Ordering::Release);
        let conn = self.conn();
        match conn {
            Some(conn) => conn.close().await,
            None => {
                self.connector.close(false).await;
                false
            }
        }
    }

    pub async fn send_packet(&self, packet: Packet) {
        if let Some(conn) = self.conn() {
            conn.write_packet(packet).await;
        }
    }

    pub async fn send_data(&self, data: Bytes) {
        if let Some(conn) = self.conn() {
            conn.write_data(data).await;
        }
    }

    pub async fn send_packet_await(&self, packet: Packet) -> AppResult<Option<Packet>> {
        match self.conn() {
            Some(conn) => conn.write_packet_await(packet).await,
            None => Ok(None),
        }
    }
}
