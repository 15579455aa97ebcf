use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{self, Duration};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::MaybeTlsStream;
use tracing::{debug, error, trace, warn};

use crate::network::transport::Transport;
use crate::network::{Callbacks, Connection, ConnectionMgr};
use crate::protocol::CodecFactory;
use crate::{AppResult, Shutdown};

const REACCEPT_DELAY: Duration = Duration::from_millis(5);
const MAX_REACCEPT_DELAY: Duration = Duration::from_secs(1);

/// WebSocket accept loop: same shape as the TCP server, with a handshake
/// upgrade in the per-socket task and the configured max packet size
/// applied as the read limit.
pub struct WsServer {
    listener: TcpListener,
    name: String,
    max_conn: usize,
    max_packet_size: usize,
    conn_mgr: Arc<ConnectionMgr>,
    codec_factory: CodecFactory,
    callbacks: Callbacks,
    max_queue_size: usize,
    notify_shutdown: broadcast::Sender<()>,
}

impl WsServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listener: TcpListener,
        name: impl Into<String>,
        max_conn: usize,
        max_packet_size: usize,
        codec_factory: CodecFactory,
        callbacks: Callbacks,
        max_queue_size: usize,
        notify_shutdown: broadcast::Sender<()>,
    ) -> WsServer {
        WsServer {
            listener,
            name: name.into(),
            max_conn,
            max_packet_size,
            conn_mgr: Arc::new(ConnectionMgr::new()),
            codec_factory,
            callbacks,
            max_queue_size,
            notify_shutdown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conn_mgr(&self) -> &Arc<ConnectionMgr> {
        &self.conn_mgr
    }

    pub fn local_addr(&self) -> AppResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(&self) -> AppResult<()> {
        tracing::info!("{} start, listen {}", self.name, self.listener.local_addr()?);
        let mut shutdown = Shutdown::new(self.notify_shutdown.subscribe());
        let mut delay = Duration::ZERO;

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.recv() => {
                    debug!("{} accept loop received shutdown signal", self.name);
                    break;
                }
            };

            match accepted {
                Ok((socket, _)) => {
                    delay = Duration::ZERO;
                    if self.conn_mgr.conn_count() >= self.max_conn {
                        warn!(
                            "{} connection limit {} reached, rejecting new socket",
                            self.name, self.max_conn
                        );
                        drop(socket);
                        continue;
                    }
                    self.connection_handle(socket);
                }
                Err(e) => {
                    delay = if delay.is_zero() {
                        REACCEPT_DELAY
                    } else {
                        (delay * 2).min(MAX_REACCEPT_DELAY)
                    };
                    warn!(
                        "{} accept error: {}, retrying in {:?}",
                        self.name, e, delay
                    );
                    time::sleep(delay).await;
                }
            }
        }

        self.conn_mgr.clean().await;
        Ok(())
    }

    fn connection_handle(&self, socket: TcpStream) {
        let conn_mgr = self.conn_mgr.clone();
        let codec_factory = self.codec_factory.clone();
        let callbacks = self.build_callbacks();
        let max_queue_size = self.max_queue_size;
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_packet_size);

        tokio::spawn(async move {
            let stream = match tokio_tungstenite::accept_async_with_config(
                MaybeTlsStream::Plain(socket),
                Some(ws_config),
            )
            .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    error!("websocket handshake failed: {}", e);
                    return;
                }
            };
            let transport = match Transport::websocket(stream) {
                Ok(transport) => transport,
                Err(e) => {
                    error!("wrap websocket stream failed: {}", e);
                    return;
                }
            };
            let conn = Connection::new(transport, codec_factory, callbacks, max_queue_size);
            if !conn.start().await {
                error!("new ws connection start failed");
                return;
            }
            conn_mgr.add_conn(conn);
        });
    }

    fn build_callbacks(&self) -> Callbacks {
        let mut callbacks = self.callbacks.clone();
        let conn_mgr = self.conn_mgr.clone();
        callbacks.close = Some(Arc::new(move |conn: Arc<Connection>| {
            let conn_mgr = conn_mgr.clone();
            Box::pin(async move {
                trace!("close connection: {}", conn.id());
                conn_mgr.del_conn(conn.id());
                conn.on_connection().await;
            })
        }));
        callbacks
    }

    pub async fn stop(&self) {
        let _ = self.notify_shutdown.send(());
        warn!("stop {} server", self.name);
    }
}
