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

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::buffer::{PacketReader, PacketWriter};
use crate::protocol::{Codec, Packet, TransportKind};
use crate::{AppError, AppResult};

pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Length-prefixed envelope codec, the wire format used by the RPC-capable
/// TCP transport.
///
/// Per message, big-endian fixed-width and variable fields in order:
/// `dataLen:i32`, `idLen:i32` (+ id bytes if > 0), `sessionIdLen:i32`
/// (+ session id bytes if > 0), `sequence:u64` varint, `status:i32`,
/// then `dataLen` raw payload bytes.
#[derive(Debug)]
pub struct HeadCodec {
    max_packet_size: usize,
}

impl HeadCodec {
    pub fn new() -> HeadCodec {
        HeadCodec {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> HeadCodec {
        HeadCodec { max_packet_size }
    }

    fn parse(reader: &mut PacketReader, max_packet_size: usize) -> AppResult<Packet> {
        let data_len = reader.read_i32()?;
        if data_len < 0 {
            return Err(AppError::MalformedPacket(format!(
                "data length {} less than 0",
                data_len
            )));
        }
        if data_len as usize > max_packet_size {
            return Err(AppError::PacketTooLarge(format!(
                "packet of length {} is too large",
                data_len
            )));
        }

        let id = Self::parse_name(reader, "id")?;
        let session_id = Self::parse_name(reader, "session id")?;
        let sequence = reader.read_u64_varint()?;
        let status = reader.read_i32()?;
        let data = Bytes::copy_from_slice(reader.read_bytes(data_len as usize)?);

        let mut packet = Packet::new();
        packet.set_id(id);
        packet.set_session_id(session_id);
        packet.set_sequence(sequence);
        packet.set_status(status);
        packet.set_data(data);
        Ok(packet)
    }

    fn parse_name(reader: &mut PacketReader, field: &str) -> AppResult<String> {
        let len = reader.read_i32()?;
        if len < 0 {
            return Err(AppError::MalformedPacket(format!(
                "{} length {} less than 0",
                field, len
            )));
        }
        if len == 0 {
            return Ok(String::new());
        }
        let raw = reader.read_bytes(len as usize)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| AppError::MalformedPacket(format!("{} is not valid utf-8", field)))
    }
}

impl Default for HeadCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for HeadCodec {
    fn init(&mut self, kind: TransportKind) -> bool {
        kind == TransportKind::Tcp
    }

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> AppResult<()> {
        let data = packet.data();
        if data.len() > self.max_packet_size {
            return Err(AppError::PacketTooLarge(format!(
                "packet of length {} is too large",
                data.len()
            )));
        }

        let mut writer = PacketWriter::new(dst);
        writer.put_i32(data.len() as i32);

        let id = packet.id().as_bytes();
        writer.put_i32(id.len() as i32);
        if !id.is_empty() {
            writer.put_bytes(id);
        }

        let session_id = packet.session_id().as_bytes();
        writer.put_i32(session_id.len() as i32);
        if !session_id.is_empty() {
            writer.put_bytes(session_id);
        }

        writer.put_u64_varint(packet.sequence());
        writer.put_i32(packet.status());
        writer.put_bytes(data);
        Ok(())
    }

    fn decode(&mut self, src: &mut BytesMut) -> AppResult<Option<Packet>> {
        let mut reader = PacketReader::new(&src[..]);
        match Self::parse(&mut reader, self.max_packet_size) {
            Ok(packet) => {
                let consumed = reader.consumed();
                src.advance(consumed);
                Ok(Some(packet))
            }
            Err(AppError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
