//! EIP-7702 authorizations: signed tuples that point an externally owned
//! account at another account's code.

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    common::{
        Address, Word,
        hash::keccak256,
        rlp,
        signature::{SignatureError, recover_address, sign_hash},
    },
    state::StateDb,
};

/// Code prefix of a delegation designation: `0xef0100 ++ address`.
pub const DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];
const DELEGATION_LENGTH: usize = DELEGATION_PREFIX.len() + 20;

/// Intrinsic gas per tuple, assuming the authority is a new account.
pub const PER_EMPTY_ACCOUNT_COST: u64 = 25_000;
pub const PER_AUTH_BASE_COST: u64 = 12_500;

const SET_CODE_TX_MAGIC: u8 = 0x05;

pub fn delegation_code(target: &Address) -> Vec<u8> {
    let mut code = Vec::with_capacity(DELEGATION_LENGTH);
    code.extend_from_slice(&DELEGATION_PREFIX);
    code.extend_from_slice(&target.0);
    code
}

/// Target of a delegation designation, `None` for any other code.
pub fn parse_delegation(code: &[u8]) -> Option<Address> {
    if code.len() != DELEGATION_LENGTH {
        return None;
    }
    let target = code.strip_prefix(&DELEGATION_PREFIX)?;
    Address::try_from(target).ok()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("EIP-7702 authorization chain ID mismatch")]
    WrongChainId,
    #[error("EIP-7702 authorization nonce > 64 bit")]
    NonceOverflow,
    #[error("EIP-7702 authorization has invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("EIP-7702 authorization destination is a contract")]
    DestinationHasCode,
    #[error("EIP-7702 authorization nonce does not match current account nonce: have {have}, want {want}")]
    NonceMismatch { have: u64, want: u64 },
    #[error("EIP-7702 authorization is not allowed for accounts with a non-legacy key")]
    KeyTypeNotAllowed,
    #[error("EIP-7702 delegation could not be stored: {0}")]
    CodeNotStored(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub chain_id: Word,
    pub address: Address,
    pub nonce: u64,
    pub y_parity: u8,
    pub r: Word,
    pub s: Word,
}

impl Authorization {
    /// `keccak256(0x05 ++ rlp([chain_id, address, nonce]))`
    pub fn signing_hash(chain_id: &Word, address: &Address, nonce: u64) -> [u8; 32] {
        let mut items = Vec::with_capacity(64);
        rlp::encode_word(&mut items, chain_id);
        rlp::encode_bytes(&mut items, &address.0);
        rlp::encode_u64(&mut items, nonce);
        let mut payload = vec![SET_CODE_TX_MAGIC];
        payload.extend(rlp::encode_list(&items));
        keccak256(&payload)
    }

    pub fn sign(
        key: &SigningKey,
        chain_id: Word,
        address: Address,
        nonce: u64,
    ) -> Result<Self, SignatureError> {
        let hash = Self::signing_hash(&chain_id, &address, nonce);
        let (y_parity, r, s) = sign_hash(key, &hash)?;
        Ok(Self {
            chain_id,
            address,
            nonce,
            y_parity,
            r: Word::from_bytes(&r),
            s: Word::from_bytes(&s),
        })
    }

    /// Account that signed the tuple.
    pub fn authority(&self) -> Result<Address, SignatureError> {
        let hash = Self::signing_hash(&self.chain_id, &self.address, self.nonce);
        recover_address(
            &hash,
            self.y_parity,
            &self.r.into_bytes(),
            &self.s.into_bytes(),
            false,
        )
    }
}

/// Checks `auth` against the current state and returns its authority. The
/// authority is warmed as soon as it is known, even if a later check fails.
pub fn validate_authorization(
    state: &mut dyn StateDb,
    chain_id: &Word,
    auth: &Authorization,
) -> Result<Address, AuthorizationError> {
    if !auth.chain_id.is_zero() && &auth.chain_id != chain_id {
        return Err(AuthorizationError::WrongChainId);
    }
    if auth.nonce == u64::MAX {
        return Err(AuthorizationError::NonceOverflow);
    }
    let authority = auth.authority()?;

    state.add_address_to_access_list(&authority);
    let code = state.code(&authority);
    if !code.is_empty() && parse_delegation(&code).is_none() {
        return Err(AuthorizationError::DestinationHasCode);
    }
    let have = state.nonce(&authority);
    if have != auth.nonce {
        return Err(AuthorizationError::NonceMismatch {
            have,
            want: auth.nonce,
        });
    }
    Ok(authority)
}

/// Validates `auth` and installs (or clears, for the zero address) the
/// delegation on its authority.
pub fn apply_authorization(
    state: &mut dyn StateDb,
    chain_id: &Word,
    auth: &Authorization,
) -> Result<Address, AuthorizationError> {
    let authority = validate_authorization(state, chain_id, auth)?;

    let snapshot = state.snapshot();
    if state.exist(&authority) {
        if !state.key(&authority).is_legacy() {
            return Err(AuthorizationError::KeyTypeNotAllowed);
        }
        state.add_refund(PER_EMPTY_ACCOUNT_COST - PER_AUTH_BASE_COST);
    }

    state.set_nonce(&authority, auth.nonce + 1);
    let code = if auth.address.is_zero() {
        Vec::new()
    } else {
        delegation_code(&auth.address)
    };
    if let Err(err) = state.set_code(&authority, code) {
        state.revert_to_snapshot(snapshot);
        return Err(AuthorizationError::CodeNotStored(err.to_string()));
    }
    Ok(authority)
}
