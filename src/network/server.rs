use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{trace, warn};

use crate::network::{Callbacks, Client, ConnCallback, Session, TcpServer};
use crate::protocol::head_codec_factory;
use crate::service::{HandlerRegistry, ServerConfig};
use crate::{AppResult, SessionMgr};

/// Application-level server shell.
///
/// Composes a TCP server, a session manager, and a handler registry: every
/// accepted connection gets one asynchronous session (sessionId = connId),
/// inbound packets are routed to the session named by their session id
/// (falling back to the connection id) and dispatched through the registry.
/// Named remote links to other services are connected on startup.
pub struct Server {
    config: Arc<ServerConfig>,
    session_mgr: Arc<SessionMgr>,
    registry: Arc<HandlerRegistry>,
    remotes: DashMap<String, Arc<Client>>,
    notify_shutdown: broadcast::Sender<()>,
    new_conn_callback: Option<ConnCallback>,
    dis_conn_callback: Option<ConnCallback>,
}

impl Server {
    pub fn new(config: Arc<ServerConfig>) -> Server {
        let (notify_shutdown, _) = broadcast::channel(1);
        Server {
            config,
            session_mgr: Arc::new(SessionMgr::new()),
            registry: Arc::new(HandlerRegistry::new()),
            remotes: DashMap::new(),
            notify_shutdown,
            new_conn_callback: None,
            dis_conn_callback: None,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn session_mgr(&self) -> &Arc<SessionMgr> {
        &self.session_mgr
    }

    pub fn set_new_conn_callback(&mut self, callback: ConnCallback) {
        self.new_conn_callback = Some(callback);
    }

    pub fn set_dis_conn_callback(&mut self, callback: ConnCallback) {
        self.dis_conn_callback = Some(callback);
    }

    pub fn remote(&self, name: &str) -> Option<Arc<Client>> {
        self.remotes.get(name).map(|entry| entry.value().clone())
    }

    /// Connects the configured remote links, then serves until shutdown.
    pub async fn run(&self) -> AppResult<()> {
        for remote in &self.config.remotes {
            let addr = format!("{}:{}", remote.host, remote.port);
            let mut client = Client::tcp(
                remote.name.clone(),
                addr,
                head_codec_factory(),
                Callbacks::new(),
                self.config.network.max_queue_size,
            );
            client.set_timeout(Duration::from_secs(self.config.client.connect_timeout));
            let client = Arc::new(client);
            self.remotes.insert(remote.name.clone(), client.clone());
            tokio::spawn(async move {
                client.connect().await;
            });
        }

        let addr = format!("{}:{}", self.config.network.ip, self.config.network.port);
        let listener = TcpListener::bind(&addr).await?;
        let tcp_server = TcpServer::new(
            listener,
            self.config.general.name.clone(),
            self.config.network.max_connection,
            head_codec_factory(),
            self.build_callbacks(),
            self.config.network.max_queue_size,
            self.notify_shutdown.clone(),
        );
        tcp_server.serve().await
    }

    pub fn stop(&self) {
        let _ = self.notify_shutdown.send(());
        for entry in self.remotes.iter() {
            let client = entry.value().clone();
            tokio::spawn(async move {
                client.close().await;
            });
        }
    }

    fn build_callbacks(&self) -> Callbacks {
        let session_mgr = self.session_mgr.clone();
        let registry = self.registry.clone();
        let max_queue_size = self.config.network.max_queue_size;
        let new_conn_callback = self.new_conn_callback.clone();
        let dis_conn_callback = self.dis_conn_callback.clone();
        let name = self.config.general.name.clone();

        let msg_session_mgr = self.session_mgr.clone();

        Callbacks::new()
            .on_conn(move |conn| {
                let session_mgr = session_mgr.clone();
                let registry = registry.clone();
                let new_conn_callback = new_conn_callback.clone();
                let dis_conn_callback = dis_conn_callback.clone();
                let name = name.clone();
                async move {
                    let is_closed = conn.is_closed();
                    trace!(
                        "{} server {} <- {} is {}",
                        name,
                        conn.local_addr(),
                        conn.peer_addr(),
                        if is_closed { "down" } else { "up" }
                    );
                    if is_closed {
                        if let Some(dis_conn_callback) = &dis_conn_callback {
                            dis_conn_callback(conn.clone()).await;
                        }
                        session_mgr.del_conn_sessions(conn.id());
                        session_mgr.del_session(conn.id());
                    } else {
                        let session = Session::new_async(
                            conn.clone(),
                            conn.id(),
                            registry,
                            max_queue_size,
                        );
                        session_mgr.add_session(session);
                        if let Some(new_conn_callback) = &new_conn_callback {
                            new_conn_callback(conn).await;
                        }
                    }
                }
            })
            .on_message(move |conn, packet| {
                let session_mgr = msg_session_mgr.clone();
                async move {
                    let session_id = if packet.session_id().is_empty() {
                        conn.id().to_string()
                    } else {
                        packet.session_id().to_string()
                    };
                    match session_mgr.get_session(&session_id) {
                        Some(session) => {
                            session.on_service(packet).await;
                        }
                        None => {
                            warn!(
                                "no session {} for inbound packet {:?}",
                                session_id,
                                packet.id()
                            );
                        }
                    }
                }
            })
    }
}
