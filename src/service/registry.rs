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

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::warn;

use crate::network::{ServeObj, Session};
use crate::protocol::Packet;

pub const STATUS_OK: i32 = 0;
pub const STATUS_UNKNOWN_MSG: i32 = 1;

pub type ServiceHandler =
    Arc<dyn Fn(Arc<Session>, Packet) -> BoxFuture<'static, bool> + Send + Sync>;

/// Message-id to handler table, populated by explicit registration at
/// startup. This replaces runtime reflection for method dispatch: a handler
/// is a boxed async closure keyed by the packet id.
///
/// Unknown ids are logged; when the packet carries a sequence number the
/// peer is waiting on, a nonzero-status reply is sent back so the await
/// resolves instead of hanging until disconnect.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, ServiceHandler>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    pub fn register<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Session>, Packet) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.handlers.insert(
            id.into(),
            Arc::new(move |session, packet| Box::pin(handler(session, packet))),
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
impl ServeObj for HandlerRegistry {
    async fn on_service_handle(&self, session: Arc<Session>, packet: Packet) -> bool {
        let handler = self
            .handlers
            .get(packet.id())
            .map(|entry| entry.value().clone());
        let Some(handler) = handler else {
            warn!("no handler registered for message {:?}", packet.id());
            if packet.sequence() != 0 {
                let mut reply = Packet::new();
                reply.set_id(packet.id());
                reply.set_session_id(packet.session_id());
                reply.set_sequence(packet.sequence());
                reply.set_status(STATUS_UNKNOWN_MSG);
                session.write_packet(reply).await;
            }
            return false;
        };
        handler(session, packet).await
    }
}
