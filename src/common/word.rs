use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::{ParseError, decode};

type U256 = primitive_types::U256;

/// 256-bit unsigned value: balances, prices, storage keys and slots.
#[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Word(U256);

impl std::fmt::Debug for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::fmt::LowerHex for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Word {
    pub fn into_bytes(&self) -> [u8; 32] {
        self.0.to_big_endian()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(U256::from_big_endian(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn one() -> Self {
        Self(U256::one())
    }

    pub fn max() -> Self {
        Self(U256::max_value())
    }

    /// Number of significant bits.
    pub fn bits(&self) -> usize {
        self.0.bits()
    }

    pub fn as_u64(&self) -> u64 {
        self.0.low_u64()
    }

    /// `None` when the value does not fit into 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        (self.0.bits() <= 64).then(|| self.0.low_u64())
    }

    pub fn saturating_sub(&self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn overflowing_add(&self, rhs: Self) -> (Self, bool) {
        let (word, flag) = self.0.overflowing_add(rhs.0);
        (Self(word), flag)
    }

    pub fn overflowing_sub(&self, rhs: Self) -> (Self, bool) {
        let (word, flag) = self.0.overflowing_sub(rhs.0);
        (Self(word), flag)
    }

    pub fn checked_add(&self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(&self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(&self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }

    /// `self * num / den` computed over 512 bits, so the intermediate product never wraps.
    /// Returns `None` if `den` is zero or the quotient does not fit into 256 bits.
    pub fn mul_div(&self, num: u64, den: u64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let product = self.0.full_mul(U256::from(num));
        let quotient = product / primitive_types::U512::from(den);
        U256::try_from(quotient).ok().map(Self)
    }

    pub fn from_hex(hex: &str) -> Result<Self, ParseError> {
        let hex = hex.trim_start_matches("0x");
        U256::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| ParseError::InvalidHex(hex.to_owned()))
    }
}

macro_rules! from_uint {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Word {
                fn from(value: $ty) -> Self {
                    Self(U256::from(value))
                }
            }
        )*
    };
}

from_uint!(u8, u32, u64, usize, u128, U256);

impl From<Word> for U256 {
    fn from(value: Word) -> Self {
        value.0
    }
}

/// Plain `U256` arithmetic: overflow panics, so callers that can overflow
/// use the `checked_*` methods.
macro_rules! arith {
    ($($op:ident::$method:ident, $assign:ident::$assign_method:ident);* $(;)?) => {
        $(
            impl std::ops::$op for Word {
                type Output = Word;

                fn $method(self, rhs: Word) -> Word {
                    Word(std::ops::$op::$method(self.0, rhs.0))
                }
            }

            impl std::ops::$assign for Word {
                fn $assign_method(&mut self, rhs: Word) {
                    std::ops::$assign::$assign_method(&mut self.0, rhs.0);
                }
            }
        )*
    };
}

arith! {
    Add::add, AddAssign::add_assign;
    Sub::sub, SubAssign::sub_assign;
    Mul::mul, MulAssign::mul_assign;
    Div::div, DivAssign::div_assign;
}

impl Serialize for Word {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("0x{:x}", self.0))
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Word::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

pub const fn word_bytes(s: &str) -> [u8; 32] {
    decode::<32>(s)
}

pub fn word(s: &str) -> Word {
    Word::from_bytes(&word_bytes(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div() {
        let fee = Word::from(1_000_001u64);
        assert_eq!(fee.mul_div(30, 100), Some(Word::from(300_000u64)));
        assert_eq!(Word::max().mul_div(100, 100), Some(Word::max()));
        assert_eq!(Word::max().mul_div(2, 1), None);
        assert_eq!(fee.mul_div(1, 0), None);
    }

    #[test]
    fn test_to_u64() {
        assert_eq!(Word::from(u64::MAX).to_u64(), Some(u64::MAX));
        assert_eq!((Word::from(u64::MAX) + Word::one()).to_u64(), None);
    }

    #[test]
    fn test_serde() {
        let value = word("0x1234");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"0x1234\"");
        assert_eq!(serde_json::from_str::<Word>("\"0x0\"").unwrap(), Word::zero());
        assert_eq!(serde_json::from_str::<Word>(&json).unwrap(), value);
    }
}
