#![deny(clippy::all)]
#![deny(warnings)]

//! Zero-allocation argument decoding and response encoding.
//!
//! Command handlers never see a heap-backed `Vec`: arguments arrive as a
//! `BytesCursor` over the still-framed payload, and responses are built
//! directly into a caller-owned `[u8; MessageLengthMax]` scratch buffer via
//! `ScratchWriter`. Both are `no_std` and safe to touch from ISR context.

use crate::vlq;
use crate::Error;
use crate::MESSAGE_LENGTH_MAX;

/// Reads VLQ-encoded and raw arguments from a command payload in order.
#[derive(Debug, Clone, Copy)]
pub struct BytesCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BytesCursor<'a> {
    /// Wraps `data` for sequential argument reads starting at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Reads and consumes one signed VLQ.
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        let (value, consumed) = vlq::decode_i32(self.remaining())?;
        self.pos += consumed;
        Ok(value)
    }

    /// Reads and consumes one unsigned VLQ.
    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let (value, consumed) = vlq::decode_u32(self.remaining())?;
        self.pos += consumed;
        Ok(value)
    }

    /// Reads and consumes a VLQ, truncating to `u8` (`%c` format fields).
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_u32()? as u8)
    }

    /// Reads and consumes a VLQ, truncating to `u16` (`%hu` format fields).
    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(self.read_u32()? as u16)
    }

    /// Reads and consumes a VLQ, truncating to `i16` (`%hi` format fields).
    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_i32()? as i16)
    }

    /// Reads a length-prefixed byte string (`%*s`): a VLQ length followed by
    /// that many raw bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], Error> {
        let len = self.read_u32()? as usize;
        let remaining = self.remaining();
        if len > remaining.len() {
            return Err(Error::InvalidVlq);
        }
        let slice = &remaining[..len];
        self.pos += len;
        Ok(slice)
    }

    /// `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Appends VLQ-encoded and raw fields into a fixed-capacity response buffer.
///
/// Used both for command-response payloads and for the length/CRC-patched
/// frame body the transport builds around them.
#[derive(Debug)]
pub struct ScratchWriter<'a> {
    buf: &'a mut [u8; MESSAGE_LENGTH_MAX],
    len: usize,
}

impl<'a> ScratchWriter<'a> {
    /// Starts writing at offset 0 of `buf`.
    pub fn new(buf: &'a mut [u8; MESSAGE_LENGTH_MAX]) -> Self {
        Self { buf, len: 0 }
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push_byte(&mut self, byte: u8) -> Result<(), Error> {
        if self.len >= self.buf.len() {
            return Err(Error::BufferTooSmall);
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    fn push_slice(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.len + bytes.len() > self.buf.len() {
            return Err(Error::BufferTooSmall);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Writes a signed value as a VLQ.
    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        let mut encoded = [0u8; vlq::MAX_ENCODED_LEN];
        let n = vlq::encode_i32(value, &mut encoded);
        self.push_slice(&encoded[..n])
    }

    /// Writes an unsigned value as a VLQ.
    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        let mut encoded = [0u8; vlq::MAX_ENCODED_LEN];
        let n = vlq::encode_u32(value, &mut encoded);
        self.push_slice(&encoded[..n])
    }

    /// Writes a length-prefixed byte string (`%*s`): a VLQ length then the
    /// raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_u32(bytes.len() as u32)?;
        self.push_slice(bytes)
    }

    /// Writes a single raw byte (used by the transport for header fields,
    /// not by command handlers).
    pub fn write_raw_u8(&mut self, byte: u8) -> Result<(), Error> {
        self.push_byte(byte)
    }

    /// Writes raw bytes with no length prefix (used by the transport for
    /// the CRC16 and trailing sync byte).
    pub fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.push_slice(bytes)
    }

    /// Overwrites an already-written byte in place (used by the transport
    /// to patch the length field once the frame's total size is known).
    pub fn patch_byte(&mut self, index: usize, byte: u8) -> Result<(), Error> {
        if index >= self.len {
            return Err(Error::BufferTooSmall);
        }
        self.buf[index] = byte;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_in_order() {
        let mut encoded = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut encoded);
        w.write_u32(5).unwrap();
        w.write_i32(-3).unwrap();
        w.write_bytes(b"hi").unwrap();
        let len = w.len();
        let mut cursor = BytesCursor::new(&encoded[..len]);
        assert_eq!(cursor.read_u32().unwrap(), 5);
        assert_eq!(cursor.read_i32().unwrap(), -3);
        assert_eq!(cursor.read_bytes().unwrap(), b"hi");
        assert!(cursor.is_empty());
    }

    #[test]
    fn truncated_argument_read_errors() {
        let mut cursor = BytesCursor::new(&[]);
        assert_eq!(cursor.read_u32(), Err(Error::InvalidVlq));
    }

    #[test]
    fn oversized_bytes_length_errors() {
        let mut cursor = BytesCursor::new(&[200, 1]);
        assert_eq!(cursor.read_bytes(), Err(Error::InvalidVlq));
    }

    #[test]
    fn scratch_writer_reports_buffer_full() {
        let mut buf = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut buf);
        let big = [0xffu8; MESSAGE_LENGTH_MAX];
        assert_eq!(w.write_bytes(&big), Err(Error::BufferTooSmall));
    }

    #[test]
    fn narrowing_reads_truncate() {
        let mut encoded = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut encoded);
        w.write_u32(70_000).unwrap();
        let len = w.len();
        let mut cursor = BytesCursor::new(&encoded[..len]);
        assert_eq!(cursor.read_u16().unwrap(), 70_000u32 as u16);
    }
}
