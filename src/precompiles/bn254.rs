use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G1Projective, G2Affine};
use ark_ec::{CurveGroup, pairing::Pairing};
use ark_ff::{BigInteger, One, PrimeField, Zero};

use crate::{
    error::PrecompileError,
    precompiles::{Cost, Precompile, bool_word, get_data},
};

pub const ADD_GENESIS: Precompile = Precompile::pure("bn254Add", add_genesis_cost, add);
pub const MUL_GENESIS: Precompile = Precompile::pure("bn254ScalarMul", mul_genesis_cost, mul);
pub const PAIRING_GENESIS: Precompile =
    Precompile::pure("bn254Pairing", pairing_genesis_cost, pairing);

pub const ADD_ISTANBUL: Precompile = Precompile::pure("bn254Add", add_istanbul_cost, add);
pub const MUL_ISTANBUL: Precompile = Precompile::pure("bn254ScalarMul", mul_istanbul_cost, mul);
pub const PAIRING_ISTANBUL: Precompile =
    Precompile::pure("bn254Pairing", pairing_istanbul_cost, pairing);

const ADD_COMPUTATION: u64 = 8_000;
const MUL_COMPUTATION: u64 = 100_000;
const PAIRING_BASE_COMPUTATION: u64 = 2_000_000;
const PAIRING_PER_POINT_COMPUTATION: u64 = 1_000_000;

const PAIR_LENGTH: usize = 192;

fn pairs(input: &[u8]) -> u64 {
    (input.len() / PAIR_LENGTH) as u64
}

fn add_genesis_cost(_: &[u8]) -> Cost {
    Cost::new(500, ADD_COMPUTATION)
}

fn add_istanbul_cost(_: &[u8]) -> Cost {
    Cost::new(150, ADD_COMPUTATION)
}

fn mul_genesis_cost(_: &[u8]) -> Cost {
    Cost::new(40_000, MUL_COMPUTATION)
}

fn mul_istanbul_cost(_: &[u8]) -> Cost {
    Cost::new(6_000, MUL_COMPUTATION)
}

fn pairing_computation(input: &[u8]) -> u64 {
    PAIRING_BASE_COMPUTATION + PAIRING_PER_POINT_COMPUTATION * pairs(input)
}

fn pairing_genesis_cost(input: &[u8]) -> Cost {
    Cost::new(100_000 + 80_000 * pairs(input), pairing_computation(input))
}

fn pairing_istanbul_cost(input: &[u8]) -> Cost {
    Cost::new(45_000 + 34_000 * pairs(input), pairing_computation(input))
}

/// Base field element; values at or above the modulus are rejected.
fn read_fq(bytes: &[u8]) -> Result<Fq, PrecompileError> {
    let fq = Fq::from_be_bytes_mod_order(bytes);
    if encode_fq(&fq) != bytes {
        return Err(PrecompileError::InvalidFieldElement);
    }
    Ok(fq)
}

fn encode_fq(fq: &Fq) -> [u8; 32] {
    let bytes = fq.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// `x ++ y`; `(0, 0)` is the point at infinity.
fn read_g1(bytes: &[u8]) -> Result<G1Affine, PrecompileError> {
    let x = read_fq(&bytes[..32])?;
    let y = read_fq(&bytes[32..64])?;
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::identity());
    }
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(PrecompileError::PointNotOnCurve);
    }
    Ok(point)
}

/// `x.im ++ x.re ++ y.im ++ y.re`; all zero is the point at infinity.
fn read_g2(bytes: &[u8]) -> Result<G2Affine, PrecompileError> {
    let x_im = read_fq(&bytes[..32])?;
    let x_re = read_fq(&bytes[32..64])?;
    let y_im = read_fq(&bytes[64..96])?;
    let y_re = read_fq(&bytes[96..128])?;
    let x = Fq2::new(x_re, x_im);
    let y = Fq2::new(y_re, y_im);
    if x.is_zero() && y.is_zero() {
        return Ok(G2Affine::identity());
    }
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(PrecompileError::PointNotOnCurve);
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::PointNotInSubgroup);
    }
    Ok(point)
}

fn encode_g1(point: G1Affine) -> Vec<u8> {
    let mut out = vec![0u8; 64];
    if !point.infinity {
        out[..32].copy_from_slice(&encode_fq(&point.x));
        out[32..].copy_from_slice(&encode_fq(&point.y));
    }
    out
}

fn add(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let input = get_data(input, 0, 128);
    let a = read_g1(&input[..64])?;
    let b = read_g1(&input[64..])?;
    let sum = (G1Projective::from(a) + G1Projective::from(b)).into_affine();
    Ok(encode_g1(sum))
}

fn mul(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let input = get_data(input, 0, 96);
    let point = read_g1(&input[..64])?;
    let scalar = Fr::from_be_bytes_mod_order(&input[64..]);
    let product = (G1Projective::from(point) * scalar).into_affine();
    Ok(encode_g1(product))
}

/// `(G1 ++ G2)*`; returns 1 when the product of pairings is the identity.
fn pairing(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if !input.len().is_multiple_of(PAIR_LENGTH) {
        return Err(PrecompileError::InvalidInputLength);
    }
    let mut g1 = Vec::with_capacity(input.len() / PAIR_LENGTH);
    let mut g2 = Vec::with_capacity(input.len() / PAIR_LENGTH);
    for pair in input.chunks_exact(PAIR_LENGTH) {
        g1.push(read_g1(&pair[..64])?);
        g2.push(read_g2(&pair[64..])?);
    }
    let product = Bn254::multi_pairing(g1, g2);
    Ok(bool_word(product.0.is_one()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const G1: &str = "0000000000000000000000000000000000000000000000000000000000000001\
                      0000000000000000000000000000000000000000000000000000000000000002";
    const G1_NEG: &str = "0000000000000000000000000000000000000000000000000000000000000001\
                          30644e72e131a029b85045b68181585d97816a916871ca8d3c208c16d87cfd45";
    const G1_DOUBLE: &str = "030644e72e131a029b85045b68181585d97816a916871ca8d3c208c16d87cfd3\
                             15ed738c0e0a7c92e7845f96b2ae9c0a68a6a449e3538fc7ff3ebf7a5a18a2c4";
    const G1_TRIPLE: &str = "0769bf9ac56bea3ff40232bcb1b6bd159315d84715b8e679f2d355961915abf0\
                             2ab799bee0489429554fdb7c8d086475319e63b40b9c5b57cdf1ff3dd9fe2261";
    const G2: &str = "198e9393920d483a7260bfb731fb5d25f1aa493335a9e71297e485b7aef312c2\
                      1800deef121f1e76426a00665e5c4479674322d4f75edadd46debd5cd992f6ed\
                      090689d0585ff075ec9e99ad690c3395bc4b313370b38ef355acdadcd122975b\
                      12c85ea5db8c6deb4aab71808dcb408fe3d1e7690c43d37b4ce6cc0166fa7daa";

    fn bytes(parts: &[&str]) -> Vec<u8> {
        hex::decode(parts.concat()).unwrap()
    }

    #[test]
    fn test_add() {
        assert_eq!(hex::encode(add(&bytes(&[G1, G1])).unwrap()), G1_DOUBLE);
        assert_eq!(hex::encode(add(&bytes(&[G1_DOUBLE, G1])).unwrap()), G1_TRIPLE);
        assert_eq!(add(&bytes(&[G1, G1_NEG])).unwrap(), vec![0u8; 64]);
        assert_eq!(add(&[]).unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn test_add_rejects_invalid_points() {
        let mut off_curve = bytes(&[G1, G1]);
        off_curve[63] = 3;
        assert_eq!(add(&off_curve), Err(PrecompileError::PointNotOnCurve));

        let mut above_modulus = vec![0xffu8; 64];
        above_modulus.extend_from_slice(&[0u8; 64]);
        assert_eq!(add(&above_modulus), Err(PrecompileError::InvalidFieldElement));
    }

    #[test]
    fn test_mul() {
        let mut input = bytes(&[G1]);
        input.extend_from_slice(&[0u8; 31]);
        input.push(3);
        assert_eq!(hex::encode(mul(&input).unwrap()), G1_TRIPLE);

        let mut by_zero = bytes(&[G1]);
        by_zero.extend_from_slice(&[0u8; 32]);
        assert_eq!(mul(&by_zero).unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn test_pairing() {
        assert_eq!(pairing(&[]).unwrap(), bool_word(true));
        assert_eq!(pairing(&bytes(&[G1, G2, G1_NEG, G2])).unwrap(), bool_word(true));
        assert_eq!(pairing(&bytes(&[G1, G2])).unwrap(), bool_word(false));
        assert_eq!(pairing(&[0u8; 191]), Err(PrecompileError::InvalidInputLength));
    }

    #[test]
    fn test_pricing() {
        let two_pairs = [0u8; 384];
        assert_eq!(PAIRING_GENESIS.required_gas(&two_pairs), 260_000);
        assert_eq!(PAIRING_ISTANBUL.required_gas(&two_pairs), 113_000);
        assert_eq!(MUL_GENESIS.required_gas(&[]), 40_000);
        assert_eq!(MUL_ISTANBUL.required_gas(&[]), 6_000);
        assert_eq!(ADD_ISTANBUL.cost(&[]).computation, 8_000);
    }
}
