// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, trace};

use crate::network::Connection;
use crate::protocol::Packet;
use crate::AppResult;

/// Service collaborator a session dispatches decoded packets to. This is
/// where application method routing plugs in.
#[async_trait]
pub trait ServeObj: Send + Sync {
    async fn on_service_handle(&self, session: Arc<Session>, packet: Packet) -> bool;
}

/// Logical endpoint over a connection.
///
/// The session id equals the connection id in the plain 1:1 case; a gateway
/// multiplexing many logical sessions over one socket assigns distinct ids.
/// The session holds a non-owning reference to its connection: closing the
/// session never closes the socket, only `close` does.
///
/// In asynchronous mode packets are funneled through a bounded FIFO queue
/// into a dedicated dispatcher task, so a slow handler stalls only this
/// session while packet order within the session is preserved.
pub struct Session {
    id: String,
    conn: Arc<Connection>,
    serve: Arc<dyn ServeObj>,
    queue: Option<async_channel::Sender<Packet>>,
    me: Weak<Session>,
}

impl Session {
    /// Synchronous session: the handler runs directly on the caller's task
    /// (the connection's reader), so a slow handler stalls that
    /// connection's reads.
    pub fn new(
        conn: Arc<Connection>,
        session_id: impl Into<String>,
        serve: Arc<dyn ServeObj>,
    ) -> Arc<Session> {
        Arc::new_cyclic(|me| Session {
            id: session_id.into(),
            conn,
            serve,
            queue: None,
            me: me.clone(),
        })
    }

    /// Asynchronous session with a dispatch queue of `max_queue_size`.
    ///
    /// The queue exists before the session is shared and the dispatcher is
    /// spawned here, so the first enqueue cannot race task readiness.
    pub fn new_async(
        conn: Arc<Connection>,
        session_id: impl Into<String>,
        serve: Arc<dyn ServeObj>,
        max_queue_size: usize,
    ) -> Arc<Session> {
        let (queue_tx, queue_rx) = async_channel::bounded(max_queue_size);
        let session = Arc::new_cyclic(|me| Session {
            id: session_id.into(),
            conn,
            serve,
            queue: Some(queue_tx),
            me: me.clone(),
        });
        Self::enable_read_queue(session.clone(), queue_rx);
        session
    }

    fn enable_read_queue(session: Arc<Session>, queue_rx: async_channel::Receiver<Packet>) {
        tokio::spawn(async move {
            while let Ok(packet) = queue_rx.recv().await {
                let handler_session = session.clone();
                let serve = Arc::clone(&session.serve);
                // a panicking handler must not kill the dispatcher; run the
                // handler in its own task and inspect the join result
                let handled = tokio::spawn(async move {
                    serve.on_service_handle(handler_session, packet).await;
                })
                .await;
                if let Err(e) = handled {
                    if e.is_panic() {
                        error!("session {} service handler panicked: {:?}", session.id, e);
                    }
                }
            }
            trace!("session closed {}", session.id);
        });
    }

    pub fn session_id(&self) -> &str {
        &self.id
    }

    pub fn conn_id(&self) -> &str {
        self.conn.id()
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn is_async(&self) -> bool {
        self.queue.is_some()
    }

    /// Hands a packet to the service layer, through the queue when
    /// asynchronous (blocking while the queue is full). Returns false when
    /// the session queue is already closed or the handler reported failure.
    pub async fn on_service(&self, packet: Packet) -> bool {
        if let Some(queue) = &self.queue {
            return queue.send(packet).await.is_ok();
        }
        let Some(session) = self.me.upgrade() else {
            return false;
        };
        self.serve.on_service_handle(session, packet).await
    }

    /// Closes only the dispatch queue; already-queued packets are still
    /// drained before the dispatcher exits. The socket stays open.
    pub fn close_session(&self) -> bool {
        if let Some(queue) = &self.queue {
            queue.close();
        }
        true
    }

    /// Closes the dispatch queue and the underlying connection.
    pub async fn close(&self) -> bool {
        self.close_session();
        self.conn.close().await
    }

    pub async fn write_packet(&self, packet: Packet) {
        self.conn.write_packet(packet).await;
    }

    pub async fn write_data(&self, data: Bytes) {
        self.conn.write_data(data).await;
    }

    pub async fn write_data_by_id(&self, id: &str, data: Bytes) {
        self.conn.write_data_by_id(id, data).await;
    }

    pub async fn write_packet_await(&self, packet: Packet) -> AppResult<Option<Packet>> {
        self.conn.write_packet_await(packet).await
    }

    pub fn set_context<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.conn.set_context(key, value);
    }

    pub fn get_context<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.conn.get_context(key)
    }
}
