use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{
    address::Address,
    hash::{EMPTY_CODE_HASH, keccak256},
    word::Word,
};

/// Max number of keys in a weighted multisig key.
pub const MAX_WEIGHTED_KEYS: usize = 10;
/// Max number of roles in a role-based key.
pub const MAX_ROLES: usize = 3;
/// Gas charged per key installed by an account update.
pub const KEY_CREATION_GAS: u64 = 20_000;

/// Selects which precompile table a contract resolves against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmVersion {
    /// Deployed before `Istanbul`; pinned to the genesis table forever.
    V0,
    #[default]
    V1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountKind {
    Eoa,
    Contract(VmVersion),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Transaction = 0,
    AccountUpdate = 1,
    FeePayer = 2,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedKey {
    pub weight: u32,
    pub signer: Address,
}

/// Account key. Public keys are identified by the address they recover to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AccountKey {
    Nil,
    #[default]
    Legacy,
    Public {
        signer: Address,
    },
    Fail,
    WeightedMultiSig {
        threshold: u32,
        keys: Vec<WeightedKey>,
    },
    RoleBased {
        roles: Vec<AccountKey>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountKeyError {
    #[error("AccountKeyFail is not updatable")]
    FailNotUpdatable,
    #[error("different account key type")]
    DifferentType,
    #[error("AccountKeyNil cannot be initialized to an account")]
    NilUninitializable,
    #[error("key weight is zero")]
    ZeroKeyWeight,
    #[error("duplicated key")]
    DuplicatedKey,
    #[error("weighted sum overflow")]
    WeightedSumOverflow,
    #[error("unsatisfiable threshold")]
    UnsatisfiableThreshold,
    #[error("zero length")]
    ZeroLength,
    #[error("length too long")]
    LengthTooLong,
    #[error("nested composite type")]
    NestedCompositeType,
}

impl AccountKey {
    pub fn is_legacy(&self) -> bool {
        matches!(self, AccountKey::Legacy)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, AccountKey::RoleBased { .. })
    }

    /// Checks that the key can be stored on a fresh account.
    pub fn check_init(&self) -> Result<(), AccountKeyError> {
        match self {
            AccountKey::Nil => Err(AccountKeyError::NilUninitializable),
            AccountKey::Legacy | AccountKey::Public { .. } | AccountKey::Fail => Ok(()),
            AccountKey::WeightedMultiSig { threshold, keys } => {
                check_weighted(*threshold, keys)
            }
            AccountKey::RoleBased { roles } => {
                check_roles_shape(roles)?;
                roles.iter().try_for_each(AccountKey::check_init)
            }
        }
    }

    /// Checks that `self` may replace `current`. A `Nil` role inside a
    /// role-based update keeps the current key for that role.
    pub fn check_update(&self, current: &AccountKey) -> Result<(), AccountKeyError> {
        if matches!(current, AccountKey::Fail) {
            return Err(AccountKeyError::FailNotUpdatable);
        }
        match self {
            AccountKey::RoleBased { roles } => {
                check_roles_shape(roles)?;
                let keeps_any = roles.iter().any(|key| matches!(key, AccountKey::Nil));
                if keeps_any && !current.is_composite() {
                    return Err(AccountKeyError::DifferentType);
                }
                roles
                    .iter()
                    .filter(|key| !matches!(key, AccountKey::Nil))
                    .try_for_each(AccountKey::check_init)
            }
            key => key.check_init(),
        }
    }

    /// Key stored after a successful `check_update`.
    pub fn merged_into(&self, current: &AccountKey) -> AccountKey {
        match (self, current) {
            (AccountKey::RoleBased { roles }, AccountKey::RoleBased { roles: old }) => {
                let roles = roles
                    .iter()
                    .enumerate()
                    .map(|(i, key)| match key {
                        AccountKey::Nil => old.get(i).cloned().unwrap_or(AccountKey::Nil),
                        key => key.clone(),
                    })
                    .collect();
                AccountKey::RoleBased { roles }
            }
            (key, _) => key.clone(),
        }
    }

    /// Key responsible for `role`; a missing role falls back to the transaction role.
    pub fn role_key(&self, role: Role) -> &AccountKey {
        match self {
            AccountKey::RoleBased { roles } => roles
                .get(role as usize)
                .filter(|key| !matches!(key, AccountKey::Nil))
                .or_else(|| roles.first())
                .unwrap_or(self),
            key => key,
        }
    }

    /// True if the recovered `signers` satisfy this key for `role` on behalf of `account`.
    pub fn validate_signers(&self, account: &Address, signers: &[Address], role: Role) -> bool {
        match self.role_key(role) {
            AccountKey::Nil | AccountKey::Fail | AccountKey::RoleBased { .. } => false,
            AccountKey::Legacy => signers == [*account],
            AccountKey::Public { signer } => signers == [*signer],
            AccountKey::WeightedMultiSig { threshold, keys } => {
                let unique: BTreeSet<&Address> = signers.iter().collect();
                if unique.len() != signers.len() {
                    return false;
                }
                let mut sum = 0u64;
                for signer in signers {
                    match keys.iter().find(|key| &key.signer == signer) {
                        Some(key) => sum += key.weight as u64,
                        None => return false,
                    }
                }
                sum >= *threshold as u64
            }
        }
    }

    /// Number of keys written to state by installing this key.
    pub fn key_count(&self) -> u64 {
        match self {
            AccountKey::Nil | AccountKey::Legacy | AccountKey::Fail => 0,
            AccountKey::Public { .. } => 1,
            AccountKey::WeightedMultiSig { keys, .. } => keys.len() as u64,
            AccountKey::RoleBased { roles } => roles.iter().map(AccountKey::key_count).sum(),
        }
    }

    pub fn update_gas(&self) -> u64 {
        self.key_count().saturating_mul(KEY_CREATION_GAS)
    }
}

fn check_roles_shape(roles: &[AccountKey]) -> Result<(), AccountKeyError> {
    if roles.is_empty() {
        return Err(AccountKeyError::ZeroLength);
    }
    if roles.len() > MAX_ROLES {
        return Err(AccountKeyError::LengthTooLong);
    }
    if roles.iter().any(AccountKey::is_composite) {
        return Err(AccountKeyError::NestedCompositeType);
    }
    Ok(())
}

fn check_weighted(threshold: u32, keys: &[WeightedKey]) -> Result<(), AccountKeyError> {
    if keys.is_empty() {
        return Err(AccountKeyError::ZeroLength);
    }
    if keys.len() > MAX_WEIGHTED_KEYS {
        return Err(AccountKeyError::LengthTooLong);
    }
    let mut seen = BTreeSet::new();
    let mut sum = 0u32;
    for key in keys {
        if key.weight == 0 {
            return Err(AccountKeyError::ZeroKeyWeight);
        }
        if !seen.insert(key.signer) {
            return Err(AccountKeyError::DuplicatedKey);
        }
        sum = sum
            .checked_add(key.weight)
            .ok_or(AccountKeyError::WeightedSumOverflow)?;
    }
    if threshold == 0 || sum < threshold {
        return Err(AccountKeyError::UnsatisfiableThreshold);
    }
    Ok(())
}

/// In-memory account record.
#[derive(Clone, Debug)]
pub struct Account {
    pub kind: AccountKind,
    pub balance: Word,
    pub nonce: u64,
    pub code: Vec<u8>,
    pub code_hash: [u8; 32],
    pub storage: BTreeMap<Word, Word>,
    pub key: AccountKey,
}

impl Default for Account {
    fn default() -> Self {
        Self::eoa(AccountKey::Legacy)
    }
}

impl Account {
    pub fn eoa(key: AccountKey) -> Self {
        Self {
            kind: AccountKind::Eoa,
            balance: Word::zero(),
            nonce: 0,
            code: Vec::new(),
            code_hash: EMPTY_CODE_HASH,
            storage: BTreeMap::new(),
            key,
        }
    }

    pub fn contract(version: VmVersion) -> Self {
        Self {
            kind: AccountKind::Contract(version),
            key: AccountKey::Fail,
            ..Self::eoa(AccountKey::Fail)
        }
    }

    pub fn set_code(&mut self, code: Vec<u8>) {
        self.code_hash = keccak256(&code);
        self.code = code;
    }

    /// EIP-161 emptiness.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }
}
