use bytes::{Buf, BufMut, BytesMut};
use glam::Vec2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of packet")]
    UnexpectedEnd,
    #[error("string of {0} bytes exceeds the cap of {1}")]
    StringTooLong(usize, usize),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("unknown {what} tag {value:#04x}")]
    UnknownTag { what: &'static str, value: u8 },
    #[error("bad protocol identifier {0:#010x}")]
    BadAppIdentifier(u32),
    #[error("unsupported protocol revision {0}")]
    BadRevision(u8),
    #[error("message of {0} bytes does not fit a {1} byte packet")]
    Oversize(usize, usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Big-endian packet writer. Strings are 16-bit-length-prefixed UTF-8 and
/// checked against their hard cap at encode time.
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn put_vec2(&mut self, value: Vec2) {
        self.put_f32(value.x);
        self.put_f32(value.y);
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn put_string(&mut self, value: &str, cap: usize) -> CodecResult<()> {
        let bytes = value.as_bytes();
        if bytes.len() > cap {
            return Err(CodecError::StringTooLong(bytes.len(), cap));
        }
        self.buf.put_u16(bytes.len() as u16);
        self.buf.put_slice(bytes);
        Ok(())
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Checked big-endian cursor over a received datagram.
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, len: usize) -> CodecResult<()> {
        if self.buf.len() < len {
            Err(CodecError::UnexpectedEnd)
        } else {
            Ok(())
        }
    }

    pub fn get_u8(&mut self) -> CodecResult<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u16(&mut self) -> CodecResult<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn get_u32(&mut self) -> CodecResult<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn get_f32(&mut self) -> CodecResult<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn get_vec2(&mut self) -> CodecResult<Vec2> {
        let x = self.get_f32()?;
        let y = self.get_f32()?;
        Ok(Vec2::new(x, y))
    }

    pub fn get_string(&mut self, cap: usize) -> CodecResult<String> {
        let len = self.get_u16()? as usize;
        if len > cap {
            return Err(CodecError::StringTooLong(len, cap));
        }
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        let value = std::str::from_utf8(head)
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_owned();
        self.buf = tail;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut w = PacketWriter::new();
        w.put_u32(0x0102_0304);
        w.put_u16(0x0506);
        w.put_u8(0x07);
        assert_eq!(w.as_slice(), &[1, 2, 3, 4, 5, 6, 7]);

        let mut r = PacketReader::new(w.as_slice());
        assert_eq!(r.get_u32().unwrap(), 0x0102_0304);
        assert_eq!(r.get_u16().unwrap(), 0x0506);
        assert_eq!(r.get_u8().unwrap(), 0x07);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn string_round_trip_and_caps() {
        let mut w = PacketWriter::new();
        w.put_string("orb", 32).unwrap();
        w.put_string("", 32).unwrap();

        let long = "x".repeat(33);
        assert!(matches!(
            w.put_string(&long, 32),
            Err(CodecError::StringTooLong(33, 32))
        ));

        let mut r = PacketReader::new(w.as_slice());
        assert_eq!(r.get_string(32).unwrap(), "orb");
        assert_eq!(r.get_string(32).unwrap(), "");
    }

    #[test]
    fn truncated_reads_fail() {
        let mut r = PacketReader::new(&[0x01, 0x02]);
        assert!(matches!(r.get_u32(), Err(CodecError::UnexpectedEnd)));

        let mut w = PacketWriter::new();
        w.put_u16(40);
        let mut r = PacketReader::new(w.as_slice());
        assert!(matches!(r.get_string(64), Err(CodecError::UnexpectedEnd)));
    }

    #[test]
    fn float_round_trip() {
        let mut w = PacketWriter::new();
        w.put_vec2(Vec2::new(-1.5, 4096.25));
        let mut r = PacketReader::new(w.as_slice());
        assert_eq!(r.get_vec2().unwrap(), Vec2::new(-1.5, 4096.25));
    }
}
