use bytes::{BufMut, BytesMut};
use integer_encoding::VarInt;

use crate::{AppError, AppResult};

/// Bounds-checked primitive reader over a borrowed byte slice.
///
/// Every read either consumes exactly its wire representation or fails with
/// `AppError::Incomplete`, leaving the caller free to retry once more bytes
/// arrive. Nothing is consumed from the underlying buffer until the caller
/// advances it by `consumed()`.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> PacketReader<'a> {
        PacketReader { buf, pos: 0 }
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_i32(&mut self) -> AppResult<i32> {
        if self.remaining() < 4 {
            return Err(AppError::Incomplete);
        }
        let value = i32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u64_varint(&mut self) -> AppResult<u64> {
        match u64::decode_var(&self.buf[self.pos..]) {
            Some((value, read_size)) => {
                self.pos += read_size;
                Ok(value)
            }
            None => Err(AppError::Incomplete),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> AppResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(AppError::Incomplete);
        }
        let run = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(run)
    }
}

/// Put-side companion of [`PacketReader`], writing big-endian fixed-width
/// integers, varints and raw byte runs into a `BytesMut`.
#[derive(Debug)]
pub struct PacketWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> PacketWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> PacketWriter<'a> {
        PacketWriter { buf }
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_u64_varint(&mut self, value: u64) {
        let encoded = value.encode_var_vec();
        self.buf.put_slice(&encoded);
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_round_trip() {
        let mut buf = BytesMut::new();
        let mut writer = PacketWriter::new(&mut buf);
        writer.put_i32(-7);
        writer.put_i32(i32::MAX);

        let mut reader = PacketReader::new(&buf);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_i32().unwrap(), i32::MAX);
        assert_eq!(reader.consumed(), 8);
    }

    #[test]
    fn test_varint_round_trip() {
        for value in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut buf = BytesMut::new();
            PacketWriter::new(&mut buf).put_u64_varint(value);
            let mut reader = PacketReader::new(&buf);
            assert_eq!(reader.read_u64_varint().unwrap(), value);
            assert_eq!(reader.consumed(), value.required_space());
        }
    }

    #[test]
    fn test_short_read_is_incomplete() {
        let mut reader = PacketReader::new(&[0, 0, 1]);
        assert!(matches!(reader.read_i32(), Err(AppError::Incomplete)));
        // nothing was consumed by the failed read
        assert_eq!(reader.consumed(), 0);

        let mut reader = PacketReader::new(&[1, 2]);
        assert!(matches!(reader.read_bytes(3), Err(AppError::Incomplete)));
    }
}
