//! Network Module Implementation
//!
//! The connection I/O engine: per-connection reader/writer tasks behind a
//! bounded outbound queue, request/response correlation, the session layer,
//! and the TCP/WebSocket server and client shells.
//!
//! # Components
//!
//! - `Connection`: owns one socket, its codec, and its close state
//! - `IoModule`: per-connection concurrency engine (reader/writer tasks,
//!   outbound queue, RPC pending table)
//! - `Session`: logical endpoint with optional ordered async dispatch
//! - `TcpServer`/`WsServer`: accept loops with backoff and a connection cap
//! - `Client`/`Connector`: outbound links with cancellable dial retry
//! - `Server`: application shell wiring sessions and handler dispatch

pub use callbacks::{
    AuthorizedCallback, Callbacks, CloseCallback, ConnCallback, ExitCallback, MsgCallback,
    WriteCompleteCallback,
};
pub use client::Client;
pub use connection::Connection;
pub use connection_mgr::ConnectionMgr;
pub use connector::{CancelCallback, Connector, DialCallback, TransportCallback};
pub use io_module::IoModule;
pub use server::Server;
pub use session::{ServeObj, Session};
pub use session_mgr::SessionMgr;
pub use tcp_server::TcpServer;
pub use transport::{Transport, TransportReader, TransportWriter, WsStream};
pub use ws_server::WsServer;

mod callbacks;
mod client;
mod connection;
mod connection_mgr;
mod connector;
mod io_module;
mod server;
mod session;
mod session_mgr;
mod tcp_server;
mod transport;
mod ws_server;
