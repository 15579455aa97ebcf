use std::net::SocketAddr;

use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::protocol::TransportKind;
use crate::{AppError, AppResult};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection's socket, split into read/write halves plus its
/// addresses, ready to be handed to the I/O loops.
pub struct Transport {
    kind: TransportKind,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    reader: TransportReader,
    writer: TransportWriter,
}

impl Transport {
    pub fn tcp(stream: TcpStream) -> AppResult<Transport> {
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Transport {
            kind: TransportKind::Tcp,
            local_addr,
            peer_addr,
            reader: TransportReader::Tcp(read_half),
            writer: TransportWriter::Tcp(BufWriter::new(write_half)),
        })
    }

    pub fn websocket(stream: WsStream) -> AppResult<Transport> {
        let (local_addr, peer_addr) = match stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => (tcp.local_addr()?, tcp.peer_addr()?),
            _ => {
                return Err(AppError::InvalidValue(
                    "unsupported websocket stream flavor".into(),
                ))
            }
        };
        let (sink, source) = stream.split();
        Ok(Transport {
            kind: TransportKind::WebSocket,
            local_addr,
            peer_addr,
            reader: TransportReader::Ws(source),
            writer: TransportWriter::Ws(sink),
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub(crate) fn into_split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }
}

/// Read side of a transport, normalized to "append a chunk of bytes".
///
/// For TCP a chunk is whatever the socket yields; for WebSocket a chunk is
/// one data message (control frames are skipped, close counts as EOF).
pub enum TransportReader {
    Tcp(OwnedReadHalf),
    Ws(SplitStream<WsStream>),
}

impl TransportReader {
    /// Appends the next chunk to `buf`, returning the number of bytes
    /// added. 0 means the peer closed the connection.
    pub async fn read_chunk(&mut self, buf: &mut BytesMut) -> AppResult<usize> {
        match self {
            TransportReader::Tcp(read_half) => Ok(read_half.read_buf(buf).await?),
            TransportReader::Ws(source) => loop {
                let message = match source.next().await {
                    None => return Ok(0),
                    Some(Ok(message)) => message,
                    Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                        return Ok(0)
                    }
                    Some(Err(e)) => {
                        return Err(AppError::DetailedIoError(format!(
                            "websocket read error: {}",
                            e
                        )))
                    }
                };
                match message {
                    Message::Binary(data) if !data.is_empty() => {
                        buf.extend_from_slice(&data);
                        return Ok(data.len());
                    }
                    Message::Text(text) if !text.is_empty() => {
                        buf.extend_from_slice(text.as_bytes());
                        return Ok(text.len());
                    }
                    Message::Close(_) => return Ok(0),
                    // empty data frames and ping/pong are not packets
                    _ => continue,
                }
            },
        }
    }
}

/// Write side of a transport. One `write_chunk` maps to one WebSocket
/// message, preserving the message-boundary framing the WS codec relies on.
pub enum TransportWriter {
    Tcp(BufWriter<OwnedWriteHalf>),
    Ws(SplitSink<WsStream, Message>),
}

impl TransportWriter {
    pub async fn write_chunk(&mut self, bytes: &[u8]) -> AppResult<()> {
        match self {
            TransportWriter::Tcp(write_half) => Ok(write_half.write_all(bytes).await?),
            TransportWriter::Ws(sink) => sink
                .feed(Message::Binary(bytes.to_vec()))
                .await
                .map_err(|e| AppError::DetailedIoError(format!("websocket write error: {}", e))),
        }
    }

    pub async fn flush(&mut self) -> AppResult<()> {
        match self {
            TransportWriter::Tcp(write_half) => Ok(write_half.flush().await?),
            TransportWriter::Ws(sink) => sink
                .flush()
                .await
                .map_err(|e| AppError::DetailedIoError(format!("websocket flush error: {}", e))),
        }
    }
}
