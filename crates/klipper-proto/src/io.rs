//! Blocking byte-stream glue for host-side tests and tools.
//!
//! `Firmware::poll` (in `klipper-mcu-firmware`) is the real entry point on
//! device; this module exists so host-side integration tests and harnesses
//! can drive a [`Transport`] against an ordinary blocking `Read`/`Write`
//! byte stream (a serial port, a pipe, a mock) without reimplementing the
//! read-frame-ack loop each time. There is no async executor here: spec.md's
//! concurrency model has no suspension points, so neither does this helper.
//!
//! Only available with the `std` feature.

#![cfg(feature = "std")]

use std::io::{Read, Write};

use crate::cursor::ScratchWriter;
use crate::transport::{self, ReceiveEvent, Transport};
use crate::{Error, MESSAGE_LENGTH_MAX};

/// Wraps a blocking byte stream with a [`Transport`] and a read buffer.
pub struct FramedIo<T> {
    inner: T,
    transport: Transport,
    buf: Vec<u8>,
    filled: usize,
}

impl<T> FramedIo<T>
where
    T: Read + Write,
{
    /// Wraps `inner`, starting from a freshly synchronized [`Transport`].
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            transport: Transport::new(),
            buf: vec![0u8; 4096],
            filled: 0,
        }
    }

    /// Reads from the underlying stream until at least one frame event is
    /// produced, ACKing the frame (or the resync) before returning it.
    ///
    /// The returned payload, if any, is only valid until the next call.
    pub fn next_event(&mut self) -> Result<FramedEvent, Error> {
        loop {
            if self.filled > 0 {
                let (consumed, event) = self.transport.receive(&self.buf[..self.filled]);
                if consumed > 0 {
                    self.buf.copy_within(consumed..self.filled, 0);
                    self.filled -= consumed;
                }
                match event {
                    ReceiveEvent::Incomplete => {}
                    ReceiveEvent::Resynced { ack_seq } => {
                        self.send_ack(ack_seq)?;
                        return Ok(FramedEvent::Resynced);
                    }
                    ReceiveEvent::Desynced => return Ok(FramedEvent::Desynced),
                    ReceiveEvent::AckOnly { ack_seq } => {
                        self.send_ack(ack_seq)?;
                        return Ok(FramedEvent::AckOnly);
                    }
                    ReceiveEvent::Frame { payload, ack_seq, host_reset } => {
                        self.send_ack(ack_seq)?;
                        return Ok(FramedEvent::Dispatch {
                            payload: payload.to_vec(),
                            host_reset,
                        });
                    }
                }
            }
            if self.filled == self.buf.len() {
                self.buf.resize(self.buf.len() * 2, 0);
            }
            let n = self
                .inner
                .read(&mut self.buf[self.filled..])
                .map_err(|_| Error::IncompleteFrame)?;
            if n == 0 {
                return Ok(FramedEvent::Eof);
            }
            self.filled += n;
        }
    }

    fn send_ack(&mut self, seq: u8) -> Result<(), Error> {
        let mut out = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut out);
        transport::encode_ack(seq, &mut w)?;
        self.inner.write_all(w.as_slice()).map_err(|_| Error::IncompleteFrame)
    }

    /// Writes a response frame built by `write_payload` using the current
    /// `expected_seq` (matching the sequence of the frame being answered).
    pub fn send_frame(
        &mut self,
        write_payload: impl FnOnce(&mut ScratchWriter) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut out = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut out);
        transport::encode_frame(self.transport.expected_seq(), &mut w, write_payload)?;
        self.inner.write_all(w.as_slice()).map_err(|_| Error::IncompleteFrame)
    }
}

/// One event produced by [`FramedIo::next_event`].
#[derive(Debug)]
pub enum FramedEvent {
    /// A command payload is ready for dispatch.
    Dispatch { payload: Vec<u8>, host_reset: bool },
    /// A frame arrived out of sequence; an ACK was sent but nothing
    /// dispatched.
    AckOnly,
    /// The receiver resynchronized on a sync byte.
    Resynced,
    /// A frame failed validation and the receiver dropped out of sync.
    Desynced,
    /// The underlying stream reached end-of-file.
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::BytesCursor;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame_over_an_in_memory_stream() {
        let mut wire = Vec::new();
        {
            let mut buf = [0u8; MESSAGE_LENGTH_MAX];
            let mut w = ScratchWriter::new(&mut buf);
            transport::encode_frame(0x10, &mut w, |w| w.write_u32(7)).unwrap();
            wire.extend_from_slice(w.as_slice());
        }
        let mut io = FramedIo::new(Cursor::new(wire));
        match io.next_event().unwrap() {
            FramedEvent::Dispatch { payload, host_reset } => {
                assert!(!host_reset);
                let mut cursor = BytesCursor::new(&payload);
                assert_eq!(cursor.read_u32().unwrap(), 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
