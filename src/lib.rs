mod network;
mod protocol;
mod service;
mod utils;

pub use network::{
    AuthorizedCallback, Callbacks, Client, CloseCallback, ConnCallback, Connection, ConnectionMgr,
    Connector, ExitCallback, IoModule, MsgCallback, ServeObj, Server, Session, SessionMgr,
    TcpServer, Transport, TransportReader, TransportWriter, WriteCompleteCallback, WsServer,
    WsStream,
};
pub use protocol::{
    head_codec_factory, stream_codec_factory, ws_codec_factory, Codec, CodecFactory, HeadCodec,
    Packet, StreamCodec, TransportKind, WsCodec,
};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, ClientConfig, GeneralConfig,
    HandlerRegistry, NetworkConfig, RemoteConfig, ServerConfig, ServiceHandler, Shutdown,
    STATUS_OK, STATUS_UNKNOWN_MSG,
};
pub use utils::SequenceGenerator;
