use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::network::Session;

/// Concurrent registry of sessions by id.
///
/// When a session's id differs from its connection's id (gateway
/// multiplexing), the manager also tracks connId -> {sessionIds} so every
/// logical session riding a socket can be torn down when that socket drops.
#[derive(Default)]
pub struct SessionMgr {
    sessions: DashMap<String, Arc<Session>>,
    conn_dict: DashMap<String, DashSet<String>>,
}

impl SessionMgr {
    pub fn new() -> SessionMgr {
        SessionMgr::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn add_session(&self, session: Arc<Session>) {
        let session_id = session.session_id().to_string();
        let conn_id = session.conn_id().to_string();
        self.sessions.insert(session_id.clone(), session);

        if session_id != conn_id {
            self.conn_dict
                .entry(conn_id)
                .or_default()
                .insert(session_id);
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    /// Removes a session, closing its dispatch queue. The connection is
    /// left untouched.
    pub fn del_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(session_id)?;
        session.close_session();

        if let Some(linked) = self.conn_dict.get(session.conn_id()) {
            linked.remove(session_id);
        }
        Some(session)
    }

    /// Bulk removal of every session multiplexed over one connection, used
    /// by gateways when the socket drops. Returns the removed sessions.
    pub fn del_conn_sessions(&self, conn_id: &str) -> Vec<Arc<Session>> {
        let Some((_, linked)) = self.conn_dict.remove(conn_id) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for session_id in linked.iter() {
            if let Some((_, session)) = self.sessions.remove(session_id.key()) {
                session.close_session();
                removed.push(session);
            }
        }
        removed
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, &Arc<Session>) -> bool) {
        for entry in self.sessions.iter() {
            if !f(entry.key(), entry.value()) {
                break;
            }
        }
    }
}
