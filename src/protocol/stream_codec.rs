use bytes::BytesMut;

use crate::protocol::{Codec, Packet, TransportKind};
use crate::AppResult;

/// Degenerate codec with no framing: whatever chunk the transport read is
/// delivered as one packet's payload. Used for raw byte-stream scenarios
/// (echo servers, proxied legacy protocols).
#[derive(Debug, Default)]
pub struct StreamCodec;

impl StreamCodec {
    pub fn new() -> StreamCodec {
        StreamCodec
    }
}

impl Codec for StreamCodec {
    fn init(&mut self, kind: TransportKind) -> bool {
        kind == TransportKind::Tcp
    }

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> AppResult<()> {
        dst.extend_from_slice(packet.data());
        Ok(())
    }

    fn decode(&mut self, src: &mut BytesMut) -> AppResult<Option<Packet>> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut packet = Packet::new();
        packet.set_data(src.split().freeze());
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_codec_takes_whole_buffer() {
        let mut codec = StreamCodec::new();
        let mut buf = BytesMut::from(&b"raw bytes"[..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.data().as_ref(), b"raw bytes");
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
