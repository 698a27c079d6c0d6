use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::{ParseError, decode, hash::keccak256, rlp, word::Word};

/// Highest address reserved for precompiled contracts.
pub const LAST_PRECOMPILE_ADDRESS: u16 = 0x03ff;

#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Address with `index` in its two lowest bytes, e.g. `0x..03fd`.
    pub const fn precompile(index: u16) -> Self {
        let mut bytes = [0u8; 20];
        let be = index.to_be_bytes();
        bytes[18] = be[0];
        bytes[19] = be[1];
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| byte == &0)
    }

    /// True for addresses inside the reserved precompile range `0x01..=0x3ff`,
    /// whether or not any table assigns them.
    pub fn is_reserved_precompile(&self) -> bool {
        if self.0[..18] != [0u8; 18] {
            return false;
        }
        let index = u16::from_be_bytes([self.0[18], self.0[19]]);
        (1..=LAST_PRECOMPILE_ADDRESS).contains(&index)
    }

    /// `keccak256(rlp([sender, nonce]))[12..]`
    pub fn create(&self, nonce: u64) -> Address {
        let mut items = Vec::with_capacity(32);
        rlp::encode_bytes(&mut items, &self.0);
        rlp::encode_u64(&mut items, nonce);
        let hash = keccak256(&rlp::encode_list(&items));
        Address::from_hash(&hash)
    }

    /// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`
    pub fn create2(&self, salt: &Word, init_code: &[u8]) -> Address {
        let mut buffer = Vec::with_capacity(1 + 20 + 32 + 32);
        buffer.push(0xffu8);
        buffer.extend_from_slice(&self.0);
        buffer.extend_from_slice(&salt.into_bytes());
        buffer.extend_from_slice(&keccak256(init_code));
        Address::from_hash(&keccak256(&buffer))
    }

    fn from_hash(hash: &[u8; 32]) -> Address {
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..32]);
        Address(addr)
    }

    pub fn as_word(&self) -> Word {
        Word::from(self)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl From<&Address> for Word {
    fn from(value: &Address) -> Self {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(&value.0);
        Word::from_bytes(&bytes)
    }
}

impl From<&Word> for Address {
    fn from(value: &Word) -> Self {
        let bytes: [u8; 32] = value.into_bytes();
        let mut ret = Address::default();
        ret.0[..].copy_from_slice(&bytes[12..]);
        ret
    }
}

impl From<[u8; 20]> for Address {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = ParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 20] = value.try_into().map_err(|_| ParseError::InvalidAddress)?;
        Ok(Address(bytes))
    }
}

impl TryFrom<&str> for Address {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim_start_matches("0x");
        if value.len() != 40 {
            return Err(ParseError::InvalidAddress);
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| ParseError::InvalidAddress)?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let hex: String = Deserialize::deserialize(deserializer)?;
        Address::try_from(hex.as_str()).map_err(|_| {
            D::Error::invalid_value(serde::de::Unexpected::Str(&hex), &"20-byte hex address")
        })
    }
}

pub const fn addr(s: &str) -> Address {
    Address(decode(s))
}
