use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use thiserror::Error;

use crate::common::{address::Address, hash::keccak256};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
    #[error("signature s value is in the upper half of the curve order")]
    HighS,
    #[error("malformed signature")]
    Malformed,
    #[error("public key recovery failed")]
    Unrecoverable,
}

/// `keccak256(uncompressed_pubkey[1..])[12..]`
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address(addr)
}

/// Recovers the signer of a prehashed message. High-s signatures are only
/// accepted when `allow_high_s` is set, in which case `s` is normalized and
/// the parity flipped.
pub fn recover_address(
    hash: &[u8; 32],
    y_parity: u8,
    r: &[u8; 32],
    s: &[u8; 32],
    allow_high_s: bool,
) -> Result<Address, SignatureError> {
    if y_parity > 1 {
        return Err(SignatureError::InvalidRecoveryId(y_parity));
    }
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(r);
    bytes[32..].copy_from_slice(s);
    let mut signature = Signature::from_slice(&bytes).map_err(|_| SignatureError::Malformed)?;
    let mut parity = y_parity;
    if let Some(normalized) = signature.normalize_s() {
        if !allow_high_s {
            return Err(SignatureError::HighS);
        }
        signature = normalized;
        parity ^= 1;
    }
    let recid =
        RecoveryId::from_byte(parity).ok_or(SignatureError::InvalidRecoveryId(y_parity))?;
    let key = VerifyingKey::recover_from_prehash(hash, &signature, recid)
        .map_err(|_| SignatureError::Unrecoverable)?;
    Ok(public_key_to_address(&key))
}

/// Recovers the signer from a 65-byte `r ++ s ++ v` blob, `v` in {0, 1, 27, 28}.
pub fn recover_rsv(hash: &[u8; 32], rsv: &[u8]) -> Result<Address, SignatureError> {
    let (rs, v) = rsv.split_at_checked(64).ok_or(SignatureError::Malformed)?;
    let v = match v {
        [v @ (0 | 1)] => *v,
        [v @ (27 | 28)] => *v - 27,
        [v] => return Err(SignatureError::InvalidRecoveryId(*v)),
        _ => return Err(SignatureError::Malformed),
    };
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&rs[..32]);
    s.copy_from_slice(&rs[32..]);
    recover_address(hash, v, &r, &s, false)
}

/// Signs a prehashed message, returning `(y_parity, r, s)` with low `s`.
pub fn sign_hash(
    key: &SigningKey,
    hash: &[u8; 32],
) -> Result<(u8, [u8; 32], [u8; 32]), SignatureError> {
    let (signature, recid) = key
        .sign_prehash_recoverable(hash)
        .map_err(|_| SignatureError::Malformed)?;
    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    Ok((recid.to_byte(), r, s))
}

/// Signs a prehashed message into the 65-byte `r ++ s ++ v` layout.
pub fn sign_rsv(key: &SigningKey, hash: &[u8; 32]) -> Result<Vec<u8>, SignatureError> {
    let (v, r, s) = sign_hash(key, hash)?;
    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out.push(v + 27);
    Ok(out)
}
