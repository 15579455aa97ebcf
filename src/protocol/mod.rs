//! Wire Protocol Module
//!
//! Packet envelope, primitive buffer readers/writers, and the pluggable
//! codec contract with its three stock framings:
//!
//! - `HeadCodec`: length-prefixed envelope, the RPC-capable TCP format
//! - `StreamCodec`: no framing, one read chunk per packet
//! - `WsCodec`: one WebSocket message per packet
//!
//! Codecs are pure encode/decode over `BytesMut`; the network layer owns
//! the sockets and feeds bytes in and out. A fresh codec instance is
//! produced per connection through a `CodecFactory`.

pub use codec::{
    head_codec_factory, stream_codec_factory, ws_codec_factory, Codec, CodecFactory, TransportKind,
};
pub use head_codec::HeadCodec;
pub use packet::Packet;
pub use stream_codec::StreamCodec;
pub use ws_codec::WsCodec;

pub(crate) mod buffer;
mod codec;
mod head_codec;
mod packet;
mod stream_codec;
mod ws_codec;
