use num_bigint::BigUint;
use num_traits::Zero;

use crate::{
    common::Word,
    error::PrecompileError,
    precompiles::{Cost, Precompile, get_data},
};

/// Genesis pricing.
pub const MODEXP_EIP198: Precompile = Precompile::pure("modexp", eip198_cost, modexp);
/// Cancun repricing.
pub const MODEXP_EIP2565: Precompile = Precompile::pure("modexp", eip2565_cost, modexp);

/// Declared lengths of base, exponent and modulus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Header {
    base_len: u64,
    exp_len: u64,
    mod_len: u64,
}

impl Header {
    fn parse(input: &[u8]) -> Self {
        let len = |at: usize| {
            Word::from_bytes(&get_data(input, at, 32))
                .to_u64()
                .unwrap_or(u64::MAX)
        };
        Self {
            base_len: len(0),
            exp_len: len(32),
            mod_len: len(64),
        }
    }

    /// First (at most) 32 bytes of the exponent.
    fn exp_head(&self, input: &[u8]) -> Word {
        let body = input.get(96..).unwrap_or_default();
        let Ok(start) = usize::try_from(self.base_len) else {
            return Word::zero();
        };
        let take = self.exp_len.min(32) as usize;
        Word::from_bytes(&get_data(body, start, take))
    }

    /// Adjusted exponent length: the number of squarings the exponent implies.
    fn iterations(&self, input: &[u8]) -> u64 {
        let head = self.exp_head(input);
        let head_bits = (head.bits() as u64).saturating_sub(1);
        if self.exp_len <= 32 {
            head_bits
        } else {
            (self.exp_len - 32).saturating_mul(8).saturating_add(head_bits)
        }
    }
}

fn eip198_cost(input: &[u8]) -> Cost {
    let header = Header::parse(input);
    let x = header.base_len.max(header.mod_len) as u128;
    let complexity = if x <= 64 {
        x * x
    } else if x <= 1024 {
        x * x / 4 + 96 * x - 3072
    } else {
        (x * x / 16).saturating_add(480 * x).saturating_sub(199_680)
    };
    let iterations = header.iterations(input).max(1) as u128;
    let gas = complexity.saturating_mul(iterations) / 20;
    Cost::flat(u64::try_from(gas).unwrap_or(u64::MAX))
}

fn eip2565_cost(input: &[u8]) -> Cost {
    let header = Header::parse(input);
    let words = (header.base_len.max(header.mod_len) as u128).div_ceil(8);
    let complexity = words.saturating_mul(words);
    let iterations = header.iterations(input).max(1) as u128;
    let gas = (complexity.saturating_mul(iterations) / 3).max(200);
    Cost::flat(u64::try_from(gas).unwrap_or(u64::MAX))
}

/// `base_len ++ exp_len ++ mod_len ++ base ++ exp ++ mod`, lengths as 32-byte
/// words, missing bytes read as zero.
fn modexp(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let header = Header::parse(input);
    if header.base_len == 0 && header.mod_len == 0 {
        return Ok(Vec::new());
    }

    let size = |len: u64| {
        u32::try_from(len)
            .map(|len| len as usize)
            .map_err(|_| PrecompileError::InvalidInput("modexp length exceeds u32"))
    };
    let base_len = size(header.base_len)?;
    let exp_len = size(header.exp_len)?;
    let mod_len = size(header.mod_len)?;

    let body = input.get(96..).unwrap_or_default();
    let base = BigUint::from_bytes_be(&get_data(body, 0, base_len));
    let exp = BigUint::from_bytes_be(&get_data(body, base_len, exp_len));
    let modulus = BigUint::from_bytes_be(&get_data(body, base_len + exp_len, mod_len));

    if modulus.is_zero() {
        return Ok(vec![0u8; mod_len]);
    }

    let result = base.modpow(&exp, &modulus).to_bytes_be();
    let mut out = vec![0u8; mod_len];
    out[mod_len - result.len()..].copy_from_slice(&result);
    Ok(out)
}
