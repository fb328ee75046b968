//! Byte-level packet primitives
//!
//! All multi-byte integers travel in network byte order. Floats use one of
//! two encodings, fixed per message kind: the raw IEEE-754 bit pattern of an
//! `f32` carried as a `u32`, or a `x100` fixed-point `i16` with 0.01
//! resolution. Reads are bounds-checked and return [`WireError`] instead of
//! panicking, since every input byte comes off the network.

use thiserror::Error;

/// Scale factor of the fixed-point `i16` encoding.
pub const FIXED16_SCALE: f32 = 100.0;

/// Decoding failures for inbound datagrams.
///
/// None of these are fatal; the network loops log and drop the offending
/// datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,
    #[error("packet truncated: wanted {wanted} byte(s) at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        wanted: usize,
        available: usize,
    },
    #[error("unknown command tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("unknown action kind 0x{0:02x}")]
    UnknownKind(u8),
    #[error("display name is not valid UTF-8")]
    BadName,
}

/// Append-only builder for an outbound datagram.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Starts a packet with its 1-byte command tag.
    pub fn with_tag(tag: u8) -> Self {
        Self { buf: vec![tag] }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a float as its raw bit pattern through the integer path.
    pub fn write_f32_bits(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes a float as `x100` fixed-point. Values outside ±327.67 saturate.
    pub fn write_fixed16(&mut self, value: f32) {
        self.write_i16((value * FIXED16_SCALE) as i16);
    }

    /// Writes a length-prefixed string. Names longer than 255 bytes are
    /// truncated at a character boundary to fit the 1-byte prefix.
    pub fn write_str(&mut self, value: &str) {
        let mut end = value.len().min(u8::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push(end as u8);
        self.buf.extend_from_slice(&value.as_bytes()[..end]);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an inbound datagram.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, wanted: usize) -> Result<&'a [u8], WireError> {
        let available = self.data.len() - self.offset;
        if available < wanted {
            return Err(WireError::Truncated {
                offset: self.offset,
                wanted,
                available,
            });
        }
        let slice = &self.data[self.offset..self.offset + wanted];
        self.offset += wanted;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, WireError> {
        let bytes = self.take(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_f32_bits(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_fixed16(&mut self) -> Result<f32, WireError> {
        Ok(self.read_i16()? as f32 / FIXED16_SCALE)
    }

    /// Reads a length-prefixed string written by [`PacketWriter::write_str`].
    pub fn read_str(&mut self) -> Result<String, WireError> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::BadName)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}
