use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, trace, warn};

use crate::network::transport::Transport;
use crate::network::{Callbacks, Connection, ConnectionMgr, ExitCallback};
use crate::protocol::CodecFactory;
use crate::{AppResult, Shutdown};

const REACCEPT_DELAY: Duration = Duration::from_millis(5);
const MAX_REACCEPT_DELAY: Duration = Duration::from_secs(1);

/// TCP accept loop.
///
/// Accept errors are retried with exponential backoff (the loop keeps
/// serving); sockets beyond the connection cap are rejected immediately.
/// Each accepted socket is wrapped in a connection and started on its own
/// task, so a slow handshake never blocks the accept loop.
pub struct TcpServer {
    listener: TcpListener,
    name: String,
    max_conn: usize,
    conn_mgr: Arc<ConnectionMgr>,
    codec_factory: CodecFactory,
    callbacks: Callbacks,
    max_queue_size: usize,
    notify_shutdown: broadcast::Sender<()>,
    exit_callback: Option<ExitCallback>,
}

impl TcpServer {
    pub fn new(
        listener: TcpListener,
        name: impl Into<String>,
        max_conn: usize,
        codec_factory: CodecFactory,
        callbacks: Callbacks,
        max_queue_size: usize,
        notify_shutdown: broadcast::Sender<()>,
    ) -> TcpServer {
        TcpServer {
            listener,
            name: name.into(),
            max_conn,
            conn_mgr: Arc::new(ConnectionMgr::new()),
            codec_factory,
            callbacks,
            max_queue_size,
            notify_shutdown,
            exit_callback: None,
        }
    }

    pub fn set_exit_callback(&mut self, exit_callback: ExitCallback) {
        self.exit_callback = Some(exit_callback);
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

    /// Serves until the shutdown broadcast fires, then closes every live
    /// connection.
    pub async fn serve(&self) -> AppResult<()> {
        info!("{} start, listen {}", self.name, self.listener.local_addr()?);
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

        tokio::spawn(async move {
            let transport = match Transport::tcp(socket) {
                Ok(transport) => transport,
                Err(e) => {
                    error!("wrap accepted socket failed: {}", e);
                    return;
                }
            };
            let conn = Connection::new(transport, codec_factory, callbacks, max_queue_size);
            if !conn.start().await {
                error!("new connection start failed");
                return;
            }
            conn_mgr.add_conn(conn);
        });
    }

    /// Per-connection callbacks: the server owns the close callback, which
    /// unregisters the connection and re-fires the conn callback so the
    /// application observes the disconnect.
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
        if let Some(exit_callback) = &self.exit_callback {
            exit_callback().await;
        }
        let _ = self.notify_shutdown.send(());
        warn!("stop {} server", self.name);
    }
}
