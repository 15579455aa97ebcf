use std::sync::Arc;

use bytes::BytesMut;

use crate::protocol::Packet;
use crate::AppResult;

/// Transport flavor a codec can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    WebSocket,
}

/// Pluggable framing strategy bound to one connection.
///
/// A codec is pure framing: it never touches the socket. The I/O loops feed
/// inbound bytes into `decode` and flush the bytes `encode` produces, so the
/// same contract serves byte-stream and message-oriented transports.
///
/// `decode` returns `Ok(None)` when the buffer does not yet hold a complete
/// packet; any other failure is fatal for the connection (no
/// resynchronization is attempted on a corrupt stream).
pub trait Codec: Send {
    /// Binds the codec to a transport type. Returns false if the transport
    /// is incompatible with this framing.
    fn init(&mut self, kind: TransportKind) -> bool;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> AppResult<()>;

    fn decode(&mut self, src: &mut BytesMut) -> AppResult<Option<Packet>>;
}

/// Produces a fresh codec instance for every new connection.
///
/// Servers and clients are handed a factory rather than a codec: codecs are
/// stateful per connection and never shared between sockets.
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn Codec> + Send + Sync>;

pub fn head_codec_factory() -> CodecFactory {
    Arc::new(|| Box::new(super::HeadCodec::new()))
}

pub fn stream_codec_factory() -> CodecFactory {
    Arc::new(|| Box::new(super::StreamCodec::new()))
}

pub fn ws_codec_factory() -> CodecFactory {
    Arc::new(|| Box::new(super::WsCodec::new()))
}
