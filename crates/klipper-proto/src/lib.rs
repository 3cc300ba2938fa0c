#![deny(clippy::all)]
#![deny(warnings)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # Klipper MCU Protocol
//!
//! A `no_std` zero-allocation implementation of the Klipper host <-> MCU
//! binary protocol: framed, sequenced, CRC16-validated messages carrying a
//! VLQ-encoded command stream, plus the self-describing command registry and
//! data dictionary the host uses to resolve command ids during the identify
//! handshake.
//!
//! ## Key components
//!
//! - **[`vlq`]**: Klipper's signed variable-length quantity encoding.
//! - **[`crc`]**: the bit-exact CRC16 used for frame integrity.
//! - **[`transport`]**: the frame state machine (sync/resync, sequence
//!   tracking, ACK emission) described by the wire format.
//! - **[`registry`]**: the append-only command/response registry that backs
//!   dispatch and dictionary construction.
//! - **[`cursor`]**: zero-allocation argument decoding and response encoding
//!   helpers used by command handlers.
//! - **[`commands`]**: name/format descriptors for every required command
//!   and response.
//! - **[`dictionary`]** (`std` only): JSON + zlib rendering of the data
//!   dictionary served by `identify`.
//!
//! ## Design
//!
//! Every type here is usable from an interrupt handler: no heap allocation,
//! no blocking, no panics on malformed input. The `std` feature only adds
//! the dictionary renderer and an optional async `Framed` wrapper; the core
//! wire format works in `no_std`.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod commands;
pub mod crc;
pub mod cursor;
#[cfg(feature = "std")]
pub mod dictionary;
#[cfg(feature = "std")]
pub mod io;
pub mod registry;
pub mod transport;
pub mod vlq;

/// Common error type for the protocol crate.
///
/// Transport-protocol errors (CRC mismatch, bad length, bad sync, malformed
/// VLQ) always desynchronize the receiver. Handler argument errors and
/// unknown commands are reported to the caller but never desync — see
/// spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum Error {
    /// The buffer did not contain a complete frame yet.
    #[cfg_attr(feature = "std", error("incomplete frame"))]
    IncompleteFrame,
    /// The frame's declared length fell outside `[MessageLengthMin, MessageLengthMax]`.
    #[cfg_attr(feature = "std", error("frame length out of bounds"))]
    InvalidLength,
    /// The sequence byte's high nibble was not the `0x10` host marker.
    #[cfg_attr(feature = "std", error("invalid sequence marker"))]
    InvalidSequence,
    /// The trailing sync byte (`0x7E`) was missing.
    #[cfg_attr(feature = "std", error("invalid trailing sync byte"))]
    InvalidSync,
    /// The CRC16 of a received frame did not match.
    #[cfg_attr(feature = "std", error("CRC16 mismatch"))]
    InvalidCrc,
    /// A VLQ in the payload could not be decoded (ran past the frame end).
    #[cfg_attr(feature = "std", error("malformed VLQ"))]
    InvalidVlq,
    /// A response would not fit in the caller-provided scratch buffer.
    #[cfg_attr(feature = "std", error("scratch buffer too small"))]
    BufferTooSmall,
    /// `dispatch` was called with an id the registry never assigned.
    #[cfg_attr(feature = "std", error("unknown command id"))]
    UnknownCommand,
    /// A command handler rejected its own arguments or preconditions.
    #[cfg_attr(feature = "std", error("handler rejected the command"))]
    HandlerRejected,
}

/// Lower bound on total frame length (§4.1): length byte, sequence byte,
/// one-byte command id, CRC16, trailing sync byte.
pub const MESSAGE_LENGTH_MIN: usize = 5;
/// Upper bound on total frame length (§4.1), matching the USB-CDC packet
/// budget the reference firmware assumes.
pub const MESSAGE_LENGTH_MAX: usize = 64;
