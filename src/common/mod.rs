//! Primitives shared by the engine: words, addresses, accounts, hashing.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

pub mod account;
pub mod address;
pub mod block;
pub mod hash;
pub mod rlp;
pub mod signature;
pub mod word;

pub use address::Address;
pub use word::Word;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected 20 address bytes")]
    InvalidAddress,
    #[error("malformed hex literal '{0}'")]
    InvalidHex(String),
}

/// Byte string that (de)serializes as `0x`-prefixed hex.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Hex(pub Vec<u8>);

impl Hex {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Hex {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Hex {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Hex {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl fmt::Debug for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for Hex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);
        hex::decode(digits)
            .map(Hex)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &"0x-prefixed hex"))
    }
}

const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("non-hex character in literal"),
    }
}

/// Compile-time hex literal, right-aligned into `N` bytes. Odd digit counts
/// and a missing `0x` prefix are accepted.
pub(crate) const fn decode<const N: usize>(s: &str) -> [u8; N] {
    let s = s.as_bytes();
    let start = if s.len() >= 2 && s[0] == b'0' && s[1] == b'x' {
        2
    } else {
        0
    };
    let mut out = [0u8; N];
    let mut digit = 0;
    let mut at = s.len();
    while at > start {
        at -= 1;
        let value = nibble(s[at]);
        let byte = N - 1 - digit / 2;
        if digit % 2 == 0 {
            out[byte] = value;
        } else {
            out[byte] |= value << 4;
        }
        digit += 1;
    }
    out
}
