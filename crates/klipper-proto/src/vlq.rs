#![deny(clippy::all)]
#![deny(warnings)]

//! Klipper's variable-length quantity (VLQ) encoding.
//!
//! Values are encoded big-endian, most-significant 7-bit group first, with
//! the continuation bit (`0x80`) set on every byte but the last. The first
//! byte carries the sign: on decode, a first byte whose top two meaningful
//! bits are both set (`byte & 0x60 == 0x60`) sign-extends the accumulator
//! before the remaining groups are folded in. Unsigned values are a bit-cast
//! of the signed encoding — this mirrors the reference firmware's
//! `encode_int`/`parse_int` bit-for-bit, including its asymmetric one-byte
//! range of `[-32, 96)`.

use crate::Error;

/// Maximum number of bytes a single VLQ can occupy.
pub const MAX_ENCODED_LEN: usize = 5;

/// Encodes a signed 32-bit value as a Klipper VLQ.
///
/// Returns the encoded byte count, always in `1..=5`.
pub fn encode_i32(value: i32, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
    let v = value as u32;
    if (-(1i32 << 5)..(3i32 << 5)).contains(&value) {
        out[0] = (v & 0x7f) as u8;
        1
    } else if (-(1i32 << 12)..(3i32 << 12)).contains(&value) {
        out[0] = (((v >> 7) & 0x7f) as u8) | 0x80;
        out[1] = (v & 0x7f) as u8;
        2
    } else if (-(1i32 << 19)..(3i32 << 19)).contains(&value) {
        out[0] = (((v >> 14) & 0x7f) as u8) | 0x80;
        out[1] = (((v >> 7) & 0x7f) as u8) | 0x80;
        out[2] = (v & 0x7f) as u8;
        3
    } else if (-(1i32 << 26)..(3i32 << 26)).contains(&value) {
        out[0] = (((v >> 21) & 0x7f) as u8) | 0x80;
        out[1] = (((v >> 14) & 0x7f) as u8) | 0x80;
        out[2] = (((v >> 7) & 0x7f) as u8) | 0x80;
        out[3] = (v & 0x7f) as u8;
        4
    } else {
        out[0] = (((v >> 28) & 0x7f) as u8) | 0x80;
        out[1] = (((v >> 21) & 0x7f) as u8) | 0x80;
        out[2] = (((v >> 14) & 0x7f) as u8) | 0x80;
        out[3] = (((v >> 7) & 0x7f) as u8) | 0x80;
        out[4] = (v & 0x7f) as u8;
        5
    }
}

/// Encodes an unsigned 32-bit value as a Klipper VLQ (a bit-cast of the
/// signed encoding).
pub fn encode_u32(value: u32, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
    encode_i32(value as i32, out)
}

/// Decodes a signed VLQ from the front of `input`.
///
/// Returns the decoded value and the number of bytes consumed, or
/// [`Error::InvalidVlq`] if `input` ends before a terminating byte
/// (continuation bit clear) is found within [`MAX_ENCODED_LEN`] bytes.
pub fn decode_i32(input: &[u8]) -> Result<(i32, usize), Error> {
    let &first = input.first().ok_or(Error::InvalidVlq)?;
    let mut value: u32 = (first & 0x7f) as u32;
    if first & 0x60 == 0x60 {
        value |= 0xffff_ffe0;
    }
    if first & 0x80 == 0 {
        return Ok((value as i32, 1));
    }
    let mut consumed = 1;
    let mut prev = first;
    while prev & 0x80 != 0 {
        if consumed >= MAX_ENCODED_LEN {
            return Err(Error::InvalidVlq);
        }
        let &byte = input.get(consumed).ok_or(Error::InvalidVlq)?;
        value = (value << 7) | (byte & 0x7f) as u32;
        prev = byte;
        consumed += 1;
    }
    Ok((value as i32, consumed))
}

/// Decodes an unsigned VLQ from the front of `input` (a bit-cast of the
/// signed decode).
pub fn decode_u32(input: &[u8]) -> Result<(u32, usize), Error> {
    let (v, n) = decode_i32(input)?;
    Ok((v as u32, n))
}
