//! Just enough RLP to derive addresses and signing hashes.

use crate::common::word::Word;

fn encode_length(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let bytes = &bytes[bytes.iter().take_while(|b| **b == 0).count()..];
        out.push(offset + 55 + bytes.len() as u8);
        out.extend_from_slice(bytes);
    }
}

pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else {
        encode_length(out, bytes.len(), 0x80);
        out.extend_from_slice(bytes);
    }
}

pub fn encode_u64(out: &mut Vec<u8>, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    encode_bytes(out, &bytes[skip..]);
}

pub fn encode_word(out: &mut Vec<u8>, value: &Word) {
    let bytes = value.into_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    encode_bytes(out, &bytes[skip..]);
}

/// Wraps already-encoded items into a list.
pub fn encode_list(items: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.len() + 9);
    encode_length(&mut out, items.len(), 0xc0);
    out.extend_from_slice(items);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        let mut out = Vec::new();
        encode_u64(&mut out, 0);
        encode_u64(&mut out, 15);
        encode_u64(&mut out, 1024);
        assert_eq!(out, vec![0x80, 0x0f, 0x82, 0x04, 0x00]);
    }

    #[test]
    fn test_encode_list() {
        let mut items = Vec::new();
        encode_bytes(&mut items, b"cat");
        encode_bytes(&mut items, b"dog");
        assert_eq!(
            encode_list(&items),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
    }

    #[test]
    fn test_encode_long_string() {
        let mut out = Vec::new();
        encode_bytes(&mut out, &[0xaa; 60]);
        assert_eq!(&out[..2], &[0xb8, 60]);
        assert_eq!(out.len(), 62);
    }
}
