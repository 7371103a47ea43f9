//! Key encoding for the index.
//!
//! The index requires that no stored key is a prefix of another. Raw keys
//! give no such guarantee, so every key is stored as a varint length followed
//! by the key bytes. Varints are a prefix code: two different lengths differ
//! inside the length field, and equal lengths leave only full equality.

use smallvec::SmallVec;

/// Longest varint for a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Encoded keys up to this size are built without touching the heap.
pub const INLINE_KEY_LEN: usize = 1024;

/// An encoded key. Short keys live inline.
pub type EncodedKey = SmallVec<[u8; INLINE_KEY_LEN]>;

/// Encode a u64 as a variable-length integer.
///
/// Uses 1-10 bytes depending on the value:
/// - 0-127: 1 byte
/// - 128-16383: 2 bytes
/// - etc.
pub fn encode_varint(mut value: u64, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decode a variable-length integer.
///
/// Returns `(value, bytes_consumed)`, or `None` if `buf` ends inside the
/// varint or it does not fit a `u64`.
pub fn decode_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_LEN) {
        value |= u64::from(byte & 0x7F).checked_shl(7 * i as u32)?;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Calculate the number of bytes needed to encode a value as varint.
pub fn varint_size(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Encode `key` as length-prefixed bytes.
pub fn encode_key(key: &[u8]) -> EncodedKey {
    let mut len_buf = [0u8; MAX_VARINT_LEN];
    let len_size = encode_varint(key.len() as u64, &mut len_buf);

    let mut out = EncodedKey::with_capacity(len_size + key.len());
    out.extend_from_slice(&len_buf[..len_size]);
    out.extend_from_slice(key);
    out
}

/// Recover the raw key from an encoded key.
///
/// Returns `None` if `encoded` is not exactly one length-prefixed key.
pub fn decode_key(encoded: &[u8]) -> Option<&[u8]> {
    let (len, len_size) = decode_varint(encoded)?;
    let rest = &encoded[len_size..];
    (rest.len() as u64 == len).then_some(rest)
}
