use bytes::BytesMut;

use crate::protocol::{Codec, Packet, TransportKind};
use crate::AppResult;

/// WebSocket codec: framing is provided by the message boundary, not by
/// length prefixes, so one inbound message becomes one packet and a packet's
/// payload is sent as one message.
#[derive(Debug, Default)]
pub struct WsCodec;

impl WsCodec {
    pub fn new() -> WsCodec {
        WsCodec
    }
}

impl Codec for WsCodec {
    fn init(&mut self, kind: TransportKind) -> bool {
        kind == TransportKind::WebSocket
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
