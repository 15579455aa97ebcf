use std::sync::Arc;

use dashmap::DashMap;

use crate::network::Connection;

/// Concurrent registry of live connections by id, used by servers to find
/// connections and to fan out close on shutdown.
#[derive(Default)]
pub struct ConnectionMgr {
    conns: DashMap<String, Arc<Connection>>,
}

impl ConnectionMgr {
    pub fn new() -> ConnectionMgr {
        ConnectionMgr::default()
    }

    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    pub fn add_conn(&self, conn: Arc<Connection>) {
        self.conns.insert(conn.id().to_string(), conn);
    }

    pub fn del_conn(&self, conn_id: &str) {
        self.conns.remove(conn_id);
    }

    pub fn get_conn(&self, conn_id: &str) -> Option<Arc<Connection>> {
        self.conns.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Closes and forgets every registered connection.
    pub async fn clean(&self) {
        let conns: Vec<Arc<Connection>> = self
            .conns
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.conns.clear();
        for conn in conns {
            conn.close().await;
        }
    }
}
