use p256::{
    EncodedPoint,
    ecdsa::{Signature, VerifyingKey, signature::hazmat::PrehashVerifier},
};

use crate::{
    error::PrecompileError,
    precompiles::{Cost, Precompile, bool_word},
};

pub const P256_VERIFY: Precompile = Precompile::pure("p256Verify", p256_verify_cost, p256_verify);

const P256_VERIFY_GAS: u64 = 6900;
const INPUT_LENGTH: usize = 160;

fn p256_verify_cost(_: &[u8]) -> Cost {
    Cost::flat(P256_VERIFY_GAS)
}

/// `hash ++ r ++ s ++ x ++ y`. Returns 1 for a valid signature and empty
/// output otherwise.
fn p256_verify(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.len() != INPUT_LENGTH {
        return Ok(Vec::new());
    }
    Ok(if verify(input) { bool_word(true) } else { Vec::new() })
}

fn verify(input: &[u8]) -> bool {
    let (hash, rest) = input.split_at(32);
    let (rs, xy) = rest.split_at(64);
    let Ok(signature) = Signature::from_slice(rs) else {
        return false;
    };
    let (Ok(x), Ok(y)) = (<&[u8; 32]>::try_from(&xy[..32]), <&[u8; 32]>::try_from(&xy[32..])) else {
        return false;
    };
    let point = EncodedPoint::from_affine_coordinates(x.into(), y.into(), false);
    let Ok(key) = VerifyingKey::from_encoded_point(&point) else {
        return false;
    };
    key.verify_prehash(hash, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{SigningKey, signature::hazmat::PrehashSigner};

    fn signed_input() -> Vec<u8> {
        let key = SigningKey::from_bytes(&[0x42u8; 32].into()).unwrap();
        let hash = crate::common::hash::sha256(b"ledger");
        let signature: Signature = key.sign_prehash(&hash).unwrap();
        let point = key.verifying_key().to_encoded_point(false);

        let mut input = hash.to_vec();
        input.extend_from_slice(&signature.to_bytes());
        input.extend_from_slice(point.x().unwrap());
        input.extend_from_slice(point.y().unwrap());
        input
    }

    #[test]
    fn test_valid_signature() {
        assert_eq!(p256_verify(&signed_input()).unwrap(), bool_word(true));
    }

    #[test]
    fn test_invalid_signature_is_empty() {
        let mut input = signed_input();
        input[0] ^= 1;
        assert!(p256_verify(&input).unwrap().is_empty());

        let mut input = signed_input();
        input[159] ^= 1;
        assert!(p256_verify(&input).unwrap().is_empty());

        assert!(p256_verify(&signed_input()[..159]).unwrap().is_empty());
        assert_eq!(P256_VERIFY.required_gas(&[]), 6900);
    }
}
