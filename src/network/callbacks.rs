use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::network::Connection;
use crate::protocol::Packet;

pub type ConnCallback = Arc<dyn Fn(Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type WriteCompleteCallback =
    Arc<dyn Fn(Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type MsgCallback = Arc<dyn Fn(Arc<Connection>, Packet) -> BoxFuture<'static, ()> + Send + Sync>;
pub type AuthorizedCallback =
    Arc<dyn Fn(Arc<Connection>, Packet) -> BoxFuture<'static, bool> + Send + Sync>;
pub type ExitCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Application callback surface of a connection, fixed at construction.
///
/// The conn callback fires on connect and again on close (distinguishable
/// through `Connection::is_closed`). While an authorized callback is set and
/// the connection is not yet authorized, inbound packets are routed to it
/// instead of the message callback. Servers and clients install their own
/// close callback to unregister the connection.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) conn: Option<ConnCallback>,
    pub(crate) message: Option<MsgCallback>,
    pub(crate) close: Option<CloseCallback>,
    pub(crate) authorized: Option<AuthorizedCallback>,
    pub(crate) write_complete: Option<WriteCompleteCallback>,
}

impl Callbacks {
    pub fn new() -> Callbacks {
        Callbacks::default()
    }

    pub fn on_conn<F, Fut>(mut self, f: F) -> Callbacks
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.conn = Some(Arc::new(move |conn| Box::pin(f(conn))));
        self
    }

    pub fn on_message<F, Fut>(mut self, f: F) -> Callbacks
    where
        F: Fn(Arc<Connection>, Packet) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.message = Some(Arc::new(move |conn, packet| Box::pin(f(conn, packet))));
        self
    }

    pub fn on_close<F, Fut>(mut self, f: F) -> Callbacks
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.close = Some(Arc::new(move |conn| Box::pin(f(conn))));
        self
    }

    pub fn on_authorized<F, Fut>(mut self, f: F) -> Callbacks
    where
        F: Fn(Arc<Connection>, Packet) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.authorized = Some(Arc::new(move |conn, packet| Box::pin(f(conn, packet))));
        self
    }

    pub fn on_write_complete<F, Fut>(mut self, f: F) -> Callbacks
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.write_complete = Some(Arc::new(move |conn| Box::pin(f(conn))));
        self
    }
}
