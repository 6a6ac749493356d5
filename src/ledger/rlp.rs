//! Minimal Recursive Length Prefix encoding for transaction payloads.

/// Encodes a byte string.
#[must_use]
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    match bytes {
        [single] if *single < 0x80 => vec![*single],
        _ => {
            let mut out = length_prefix(0x80, bytes.len());
            out.extend_from_slice(bytes);
            out
        }
    }
}

/// Encodes an unsigned integer as its minimal big-endian byte string.
/// Zero encodes as the empty string.
#[must_use]
pub fn encode_uint(value: u128) -> Vec<u8> {
    encode_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

/// Encodes a big-endian integer given as raw bytes, dropping leading zeros.
#[must_use]
pub fn encode_uint_bytes(value: &[u8]) -> Vec<u8> {
    encode_bytes(trim_leading_zeros(value))
}

/// Wraps already-encoded items into a list.
#[must_use]
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len = items.iter().map(Vec::len).sum();
    let mut out = length_prefix(0xc0, payload_len);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(start..).unwrap_or_default()
}

fn length_prefix(offset: u8, len: usize) -> Vec<u8> {
    if len < 56 {
        // len < 56 fits in the single prefix byte
        #[allow(clippy::cast_possible_truncation)]
        return vec![offset + len as u8];
    }
    let raw = len.to_be_bytes();
    let len_bytes = trim_leading_zeros(&raw);
    #[allow(clippy::cast_possible_truncation)]
    let mut out = vec![offset + 55 + len_bytes.len() as u8];
    out.extend_from_slice(len_bytes);
    out
}
