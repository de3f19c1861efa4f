// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Byte buffer helpers shared by the frame codec and APDU parsers
//!
//! None of these panic on short or empty input, requests that cannot be
//! satisfied return an empty buffer (or zero).

use byteorder::{BigEndian, ByteOrder};

/// Maximum width supported for big-endian integer conversions
pub const MAX_INT_BYTES: usize = 8;

/// Encode `value` as a big-endian integer of `len` bytes
///
/// Values wider than `len` are truncated to the low-order bytes,
/// `len` is clamped to [MAX_INT_BYTES].
pub fn int_to_be_bytes(value: u64, len: usize) -> Vec<u8> {
    let len = len.min(MAX_INT_BYTES);
    if len == 0 {
        return Vec::new();
    }

    let mut buff = vec![0u8; len];
    let masked = match len {
        MAX_INT_BYTES => value,
        _ => value & ((1u64 << (len * 8)) - 1),
    };
    BigEndian::write_uint(&mut buff, masked, len);

    buff
}

/// Decode a big-endian integer from up to [MAX_INT_BYTES] bytes
///
/// Returns zero for an empty buffer, longer buffers use the trailing bytes.
pub fn be_bytes_to_int(buff: &[u8]) -> u64 {
    if buff.is_empty() {
        return 0;
    }

    let start = buff.len().saturating_sub(MAX_INT_BYTES);
    let b = &buff[start..];

    BigEndian::read_uint(b, b.len())
}

/// Fetch the first `n` bytes of a buffer (or the whole buffer if shorter)
pub fn first_bytes(buff: &[u8], n: usize) -> &[u8] {
    &buff[..n.min(buff.len())]
}

/// Fetch the last `n` bytes of a buffer (or the whole buffer if shorter)
pub fn last_bytes(buff: &[u8], n: usize) -> &[u8] {
    &buff[buff.len().saturating_sub(n)..]
}

/// Split a buffer into a head and the trailing `n` bytes
pub fn split_tail(buff: &[u8], n: usize) -> (&[u8], &[u8]) {
    buff.split_at(buff.len().saturating_sub(n))
}
