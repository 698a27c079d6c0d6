use ark_bls12_381::{Bls12_381, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{AffineRepr, CurveGroup, pairing::Pairing};
use ark_ff::{One, PrimeField};
use ark_serialize::CanonicalDeserialize;
use once_cell::sync::Lazy;

use crate::{
    common::{Word, hash::sha256, word::word_bytes},
    error::PrecompileError,
    precompiles::{Cost, Precompile},
};

pub const POINT_EVALUATION: Precompile =
    Precompile::pure("kzgPointEvaluation", point_evaluation_cost, point_evaluation);

const POINT_EVALUATION_GAS: u64 = 50_000;
const INPUT_LENGTH: usize = 192;
const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;
const FIELD_ELEMENTS_PER_BLOB: u64 = 4096;
const BLS_MODULUS: [u8; 32] =
    word_bytes("0x73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001");

/// `[tau]_2` from the KZG ceremony, compressed.
const TAU_G2: &str = "b5bfd7dd8cdeb128843bc287230af38926187075cbfbefa81009a2ce615ac53d\
                      2914e5870cb452d2afaaab24f3499f72185cbfee53492714734429b7b38608e2\
                      3926c911cceceac9a36851477ba4c60b087041de621000edc98edada20c1def2";

static SETUP: Lazy<Option<G2Affine>> = Lazy::new(|| {
    let bytes = hex::decode(TAU_G2).ok()?;
    G2Affine::deserialize_compressed(bytes.as_slice()).ok()
});

fn point_evaluation_cost(_: &[u8]) -> Cost {
    Cost::flat(POINT_EVALUATION_GAS)
}

pub fn versioned_hash(commitment: &[u8]) -> [u8; 32] {
    let mut hash = sha256(commitment);
    hash[0] = VERSIONED_HASH_VERSION_KZG;
    hash
}

fn read_scalar(bytes: &[u8]) -> Result<Fr, PrecompileError> {
    if bytes >= &BLS_MODULUS[..] {
        return Err(PrecompileError::InvalidFieldElement);
    }
    Ok(Fr::from_be_bytes_mod_order(bytes))
}

fn read_point(bytes: &[u8]) -> Result<G1Affine, PrecompileError> {
    G1Affine::deserialize_compressed(bytes)
        .map_err(|_| PrecompileError::InvalidInput("malformed G1 point"))
}

/// `versioned_hash ++ z ++ y ++ commitment(48) ++ proof(48)`: checks that the
/// committed polynomial evaluates to `y` at `z`.
fn point_evaluation(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.len() != INPUT_LENGTH {
        return Err(PrecompileError::InvalidInputLength);
    }
    let commitment = &input[96..144];
    if versioned_hash(commitment) != input[..32] {
        return Err(PrecompileError::InvalidVersionedHash);
    }

    let z = read_scalar(&input[32..64])?;
    let y = read_scalar(&input[64..96])?;
    let commitment = read_point(commitment)?;
    let proof = read_point(&input[144..192])?;
    let tau = SETUP
        .as_ref()
        .ok_or(PrecompileError::InvalidInput("trusted setup unavailable"))?;

    // e(C - [y]G1, G2) * e(-proof, [tau - z]G2) == 1
    let lhs = (G1Projective::from(commitment) - G1Affine::generator() * y).into_affine();
    let rhs = (G2Projective::from(*tau) - G2Affine::generator() * z).into_affine();
    let product = Bls12_381::multi_pairing([lhs, -proof], [G2Affine::generator(), rhs]);
    if !product.0.is_one() {
        return Err(PrecompileError::InvalidProof);
    }

    let mut out = Word::from(FIELD_ELEMENTS_PER_BLOB).into_bytes().to_vec();
    out.extend_from_slice(&BLS_MODULUS);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infinity() -> [u8; 48] {
        let mut point = [0u8; 48];
        point[0] = 0xc0;
        point
    }

    fn input(z: [u8; 32], y: [u8; 32]) -> Vec<u8> {
        let mut input = versioned_hash(&infinity()).to_vec();
        input.extend_from_slice(&z);
        input.extend_from_slice(&y);
        input.extend_from_slice(&infinity());
        input.extend_from_slice(&infinity());
        input
    }

    #[test]
    fn test_versioned_hash() {
        assert_eq!(
            hex::encode(versioned_hash(&infinity())),
            "010657f37554c781402a22917dee2f75def7ab966d7b770905398eba3c444014"
        );
    }

    #[test]
    fn test_zero_polynomial_opens_to_zero() {
        let out = point_evaluation(&input([7u8; 32], [0u8; 32])).unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(Word::from_bytes(&out[..32]), Word::from(4096u64));
        assert_eq!(&out[32..], &BLS_MODULUS[..]);
    }

    #[test]
    fn test_rejects_wrong_claims() {
        let mut y = [0u8; 32];
        y[31] = 1;
        assert_eq!(
            point_evaluation(&input([7u8; 32], y)),
            Err(PrecompileError::InvalidProof)
        );

        let mut bad_hash = input([7u8; 32], [0u8; 32]);
        bad_hash[0] = 0x02;
        assert_eq!(
            point_evaluation(&bad_hash),
            Err(PrecompileError::InvalidVersionedHash)
        );

        assert_eq!(
            point_evaluation(&input([0xff; 32], [0u8; 32])),
            Err(PrecompileError::InvalidFieldElement)
        );
        assert_eq!(
            point_evaluation(&[0u8; 191]),
            Err(PrecompileError::InvalidInputLength)
        );
    }
}
