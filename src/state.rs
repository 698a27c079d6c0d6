use std::collections::{BTreeMap, BTreeSet};

use crate::{
    common::{
        Address, Word,
        account::{Account, AccountKey, AccountKind, VmVersion},
        block::AccessTuple,
        hash::{EMPTY_ROOT_HASH, keccak256},
        rlp,
    },
    config::{Fork, Rules},
};

/// State backend consumed by the engine. Snapshots are LIFO: reverting to
/// a snapshot discards every later snapshot as well.
pub trait StateDb {
    fn exist(&self, address: &Address) -> bool;
    /// EIP-161: no nonce, no balance, no code.
    fn empty(&self, address: &Address) -> bool;

    fn create_eoa(&mut self, address: &Address, key: AccountKey);
    /// Replaces any existing account, keeping its balance.
    fn create_contract(&mut self, address: &Address, version: VmVersion);

    fn balance(&self, address: &Address) -> Word;
    fn add_balance(&mut self, address: &Address, amount: Word);
    fn sub_balance(&mut self, address: &Address, amount: Word);

    fn nonce(&self, address: &Address) -> u64;
    fn set_nonce(&mut self, address: &Address, nonce: u64);
    fn increment_nonce(&mut self, address: &Address) {
        let nonce = self.nonce(address);
        self.set_nonce(address, nonce.saturating_add(1));
    }

    fn code(&self, address: &Address) -> Vec<u8>;
    /// Zero for accounts that do not exist.
    fn code_hash(&self, address: &Address) -> [u8; 32];
    fn code_size(&self, address: &Address) -> usize {
        self.code(address).len()
    }
    fn set_code(&mut self, address: &Address, code: Vec<u8>) -> eyre::Result<()>;

    fn storage(&self, address: &Address, key: &Word) -> Word;
    fn set_storage(&mut self, address: &Address, key: Word, value: Word);
    /// Zero for accounts that do not exist.
    fn storage_root(&self, address: &Address) -> [u8; 32];

    fn transient(&self, address: &Address, key: &Word) -> Word;
    fn set_transient(&mut self, address: &Address, key: Word, value: Word);
    fn clear_transient(&mut self);
    /// Drops what the previous message left behind: transient storage, the
    /// access list and the refund counter. Earlier snapshot ids become invalid.
    fn begin_message(&mut self);

    fn key(&self, address: &Address) -> AccountKey;
    fn set_key(&mut self, address: &Address, key: AccountKey);
    /// `None` for externally owned and missing accounts.
    fn vm_version(&self, address: &Address) -> Option<VmVersion>;
    /// Contract accounts, and externally owned accounts carrying code (a delegation).
    fn is_program_account(&self, address: &Address) -> bool;

    fn add_address_to_access_list(&mut self, address: &Address);
    fn add_slot_to_access_list(&mut self, address: &Address, slot: Word);
    fn address_in_access_list(&self, address: &Address) -> bool;
    fn slot_in_access_list(&self, address: &Address, slot: &Word) -> bool;

    fn add_refund(&mut self, gas: u64);
    fn sub_refund(&mut self, gas: u64);
    fn refund(&self) -> u64;

    fn snapshot(&mut self) -> usize;
    fn revert_to_snapshot(&mut self, id: usize);

    /// Pre-warms the access list and clears transient storage for a new message.
    #[allow(clippy::too_many_arguments)]
    fn prepare(
        &mut self,
        rules: &Rules,
        sender: &Address,
        fee_payer: &Address,
        coinbase: &Address,
        dst: Option<&Address>,
        precompiles: &[Address],
        access_list: &[AccessTuple],
    ) {
        if rules.is_active(Fork::Kore) {
            self.add_address_to_access_list(sender);
            self.add_address_to_access_list(fee_payer);
            if let Some(dst) = dst {
                self.add_address_to_access_list(dst);
            }
            for address in precompiles {
                self.add_address_to_access_list(address);
            }
            for tuple in access_list {
                self.add_address_to_access_list(&tuple.address);
                for key in &tuple.storage_keys {
                    self.add_slot_to_access_list(&tuple.address, *key);
                }
            }
            if rules.is_active(Fork::Shanghai) {
                self.add_address_to_access_list(coinbase);
            }
        }
        self.clear_transient();
    }
}

/// Undo record: each variant holds the value to restore.
#[derive(Clone, Debug)]
enum Touch {
    Created(Address, Option<Box<Account>>),
    Balance(Address, Word),
    Nonce(Address, u64),
    Code(Address, Vec<u8>),
    Storage(Address, Word, Option<Word>),
    Transient(Address, Word, Word),
    Key(Address, AccountKey),
    Warm(Address),
    WarmSlot(Address, Word),
    Refund(u64),
}

/// In-memory backend with an undo journal.
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    accounts: BTreeMap<Address, Account>,
    transient: BTreeMap<(Address, Word), Word>,
    warm: BTreeSet<Address>,
    warm_slots: BTreeSet<(Address, Word)>,
    refund: u64,
    journal: Vec<Touch>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an account outside of the journal (genesis-style setup).
    pub fn insert(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    pub fn with_balance(mut self, address: Address, balance: Word) -> Self {
        let mut account = Account::eoa(AccountKey::Legacy);
        account.balance = balance;
        self.insert(address, account);
        self
    }

    pub fn with_contract(mut self, address: Address, code: Vec<u8>, version: VmVersion) -> Self {
        let mut account = Account::contract(version);
        account.set_code(code);
        self.insert(address, account);
        self
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Mutable account, materialized as a legacy EOA on first touch.
    fn touch(&mut self, address: &Address) -> &mut Account {
        if !self.accounts.contains_key(address) {
            self.journal.push(Touch::Created(*address, None));
        }
        self.accounts.entry(*address).or_default()
    }

    fn replace(&mut self, address: &Address, account: Account) {
        let previous = self.accounts.insert(*address, account).map(Box::new);
        self.journal.push(Touch::Created(*address, previous));
    }

    fn undo(&mut self, touch: Touch) {
        match touch {
            Touch::Created(address, None) => {
                self.accounts.remove(&address);
            }
            Touch::Created(address, Some(account)) => {
                self.accounts.insert(address, *account);
            }
            Touch::Balance(address, balance) => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = balance;
                }
            }
            Touch::Nonce(address, nonce) => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = nonce;
                }
            }
            Touch::Code(address, code) => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.set_code(code);
                }
            }
            Touch::Storage(address, key, value) => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    match value {
                        Some(value) => account.storage.insert(key, value),
                        None => account.storage.remove(&key),
                    };
                }
            }
            Touch::Transient(address, key, value) => {
                self.transient.insert((address, key), value);
            }
            Touch::Key(address, key) => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.key = key;
                }
            }
            Touch::Warm(address) => {
                self.warm.remove(&address);
            }
            Touch::WarmSlot(address, slot) => {
                self.warm_slots.remove(&(address, slot));
            }
            Touch::Refund(refund) => {
                self.refund = refund;
            }
        }
    }
}

impl StateDb for MemoryState {
    fn exist(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    fn empty(&self, address: &Address) -> bool {
        self.accounts.get(address).is_none_or(Account::is_empty)
    }

    fn create_eoa(&mut self, address: &Address, key: AccountKey) {
        let mut account = Account::eoa(key);
        if let Some(existing) = self.accounts.get(address) {
            account.balance = existing.balance;
        }
        self.replace(address, account);
    }

    fn create_contract(&mut self, address: &Address, version: VmVersion) {
        let mut account = Account::contract(version);
        if let Some(existing) = self.accounts.get(address) {
            account.balance = existing.balance;
        }
        self.replace(address, account);
    }

    fn balance(&self, address: &Address) -> Word {
        self.accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    fn add_balance(&mut self, address: &Address, amount: Word) {
        let account = self.touch(address);
        let previous = account.balance;
        account.balance = previous.checked_add(amount).unwrap_or(Word::max());
        self.journal.push(Touch::Balance(*address, previous));
    }

    fn sub_balance(&mut self, address: &Address, amount: Word) {
        let account = self.touch(address);
        let previous = account.balance;
        account.balance = previous.saturating_sub(amount);
        self.journal.push(Touch::Balance(*address, previous));
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.accounts
            .get(address)
            .map(|account| account.nonce)
            .unwrap_or_default()
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        let account = self.touch(address);
        let previous = account.nonce;
        account.nonce = nonce;
        self.journal.push(Touch::Nonce(*address, previous));
    }

    fn code(&self, address: &Address) -> Vec<u8> {
        self.accounts
            .get(address)
            .map(|account| account.code.clone())
            .unwrap_or_default()
    }

    fn code_hash(&self, address: &Address) -> [u8; 32] {
        self.accounts
            .get(address)
            .map(|account| account.code_hash)
            .unwrap_or_default()
    }

    fn code_size(&self, address: &Address) -> usize {
        self.accounts
            .get(address)
            .map(|account| account.code.len())
            .unwrap_or_default()
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) -> eyre::Result<()> {
        let account = self.touch(address);
        let previous = std::mem::take(&mut account.code);
        account.set_code(code);
        self.journal.push(Touch::Code(*address, previous));
        Ok(())
    }

    fn storage(&self, address: &Address, key: &Word) -> Word {
        self.accounts
            .get(address)
            .and_then(|account| account.storage.get(key).copied())
            .unwrap_or_default()
    }

    fn set_storage(&mut self, address: &Address, key: Word, value: Word) {
        let account = self.touch(address);
        let previous = if value.is_zero() {
            account.storage.remove(&key)
        } else {
            account.storage.insert(key, value)
        };
        self.journal.push(Touch::Storage(*address, key, previous));
    }

    /// Not a trie root: a digest of the sorted non-zero slots, `EMPTY_ROOT_HASH` when there are none.
    fn storage_root(&self, address: &Address) -> [u8; 32] {
        let Some(account) = self.accounts.get(address) else {
            return [0u8; 32];
        };
        if account.storage.is_empty() {
            return EMPTY_ROOT_HASH;
        }
        let mut items = Vec::with_capacity(account.storage.len() * 66);
        for (key, value) in &account.storage {
            rlp::encode_word(&mut items, key);
            rlp::encode_word(&mut items, value);
        }
        keccak256(&rlp::encode_list(&items))
    }

    fn transient(&self, address: &Address, key: &Word) -> Word {
        self.transient
            .get(&(*address, *key))
            .copied()
            .unwrap_or_default()
    }

    fn set_transient(&mut self, address: &Address, key: Word, value: Word) {
        let previous = self
            .transient
            .insert((*address, key), value)
            .unwrap_or_default();
        self.journal.push(Touch::Transient(*address, key, previous));
    }

    fn clear_transient(&mut self) {
        self.transient.clear();
    }

    fn begin_message(&mut self) {
        self.transient.clear();
        self.warm.clear();
        self.warm_slots.clear();
        self.refund = 0;
        self.journal.clear();
    }

    fn key(&self, address: &Address) -> AccountKey {
        self.accounts
            .get(address)
            .map(|account| account.key.clone())
            .unwrap_or_default()
    }

    fn set_key(&mut self, address: &Address, key: AccountKey) {
        let account = self.touch(address);
        let previous = std::mem::replace(&mut account.key, key);
        self.journal.push(Touch::Key(*address, previous));
    }

    fn vm_version(&self, address: &Address) -> Option<VmVersion> {
        match self.accounts.get(address)?.kind {
            AccountKind::Contract(version) => Some(version),
            AccountKind::Eoa => None,
        }
    }

    fn is_program_account(&self, address: &Address) -> bool {
        self.accounts.get(address).is_some_and(|account| match account.kind {
            AccountKind::Contract(_) => true,
            AccountKind::Eoa => !account.code.is_empty(),
        })
    }

    fn add_address_to_access_list(&mut self, address: &Address) {
        if self.warm.insert(*address) {
            self.journal.push(Touch::Warm(*address));
        }
    }

    fn add_slot_to_access_list(&mut self, address: &Address, slot: Word) {
        self.add_address_to_access_list(address);
        if self.warm_slots.insert((*address, slot)) {
            self.journal.push(Touch::WarmSlot(*address, slot));
        }
    }

    fn address_in_access_list(&self, address: &Address) -> bool {
        self.warm.contains(address)
    }

    fn slot_in_access_list(&self, address: &Address, slot: &Word) -> bool {
        self.warm_slots.contains(&(*address, *slot))
    }

    fn add_refund(&mut self, gas: u64) {
        self.journal.push(Touch::Refund(self.refund));
        self.refund = self.refund.saturating_add(gas);
    }

    fn sub_refund(&mut self, gas: u64) {
        self.journal.push(Touch::Refund(self.refund));
        self.refund = self.refund.saturating_sub(gas);
    }

    fn refund(&self) -> u64 {
        self.refund
    }

    fn snapshot(&mut self) -> usize {
        self.journal.len()
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        while self.journal.len() > id {
            if let Some(touch) = self.journal.pop() {
                self.undo(touch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{address::addr, hash::EMPTY_CODE_HASH};

    const ALICE: Address = addr("0x00000000000000000000000000000000000a11ce");
    const BOB: Address = addr("0x0000000000000000000000000000000000000b0b");

    #[test]
    fn test_nested_snapshots() {
        let mut state = MemoryState::new().with_balance(ALICE, Word::from(100u64));

        let outer = state.snapshot();
        state.sub_balance(&ALICE, Word::from(40u64));
        state.add_balance(&BOB, Word::from(40u64));
        state.set_storage(&BOB, Word::one(), Word::from(7u64));

        let inner = state.snapshot();
        state.set_nonce(&ALICE, 5);
        state.set_storage(&BOB, Word::one(), Word::zero());
        state.revert_to_snapshot(inner);

        assert_eq!(state.nonce(&ALICE), 0);
        assert_eq!(state.storage(&BOB, &Word::one()), Word::from(7u64));

        state.revert_to_snapshot(outer);
        assert_eq!(state.balance(&ALICE), Word::from(100u64));
        assert!(!state.exist(&BOB));
    }

    #[test]
    fn test_create_contract_keeps_balance() {
        let mut state = MemoryState::new().with_balance(BOB, Word::from(9u64));
        let snapshot = state.snapshot();
        state.create_contract(&BOB, VmVersion::V1);

        assert_eq!(state.balance(&BOB), Word::from(9u64));
        assert_eq!(state.vm_version(&BOB), Some(VmVersion::V1));
        assert_eq!(state.key(&BOB), AccountKey::Fail);
        assert!(state.is_program_account(&BOB));

        state.revert_to_snapshot(snapshot);
        assert_eq!(state.vm_version(&BOB), None);
        assert_eq!(state.key(&BOB), AccountKey::Legacy);
    }

    #[test]
    fn test_access_list_survives_later_revert() {
        let mut state = MemoryState::new();
        state.add_address_to_access_list(&ALICE);
        let snapshot = state.snapshot();
        state.add_slot_to_access_list(&BOB, Word::one());
        state.revert_to_snapshot(snapshot);

        assert!(state.address_in_access_list(&ALICE));
        assert!(!state.address_in_access_list(&BOB));
        assert!(!state.slot_in_access_list(&BOB, &Word::one()));
    }

    #[test]
    fn test_code_and_roots() {
        let mut state = MemoryState::new();
        assert_eq!(state.code_hash(&ALICE), [0u8; 32]);
        assert_eq!(state.storage_root(&ALICE), [0u8; 32]);

        state.create_eoa(&ALICE, AccountKey::Legacy);
        assert_eq!(state.code_hash(&ALICE), EMPTY_CODE_HASH);
        assert_eq!(state.storage_root(&ALICE), EMPTY_ROOT_HASH);
        assert!(state.empty(&ALICE));

        state.set_code(&ALICE, vec![0x60, 0x00]).unwrap();
        assert_eq!(state.code_size(&ALICE), 2);
        assert_eq!(state.code_hash(&ALICE), keccak256(&[0x60, 0x00]));
        state.set_storage(&ALICE, Word::one(), Word::one());
        assert_ne!(state.storage_root(&ALICE), EMPTY_ROOT_HASH);
    }

    #[test]
    fn test_refund_and_transient_revert() {
        let mut state = MemoryState::new();
        state.add_refund(100);
        let snapshot = state.snapshot();
        state.sub_refund(30);
        state.set_transient(&ALICE, Word::one(), Word::from(3u64));
        assert_eq!(state.refund(), 70);
        state.revert_to_snapshot(snapshot);
        assert_eq!(state.refund(), 100);
        assert_eq!(state.transient(&ALICE, &Word::one()), Word::zero());
    }

    #[test]
    fn test_begin_message_drops_leftovers() {
        let mut state = MemoryState::new().with_balance(ALICE, Word::from(5u64));
        state.add_refund(4_800);
        state.add_slot_to_access_list(&BOB, Word::one());
        state.set_transient(&BOB, Word::one(), Word::one());
        state.set_storage(&BOB, Word::one(), Word::from(2u64));

        state.begin_message();
        assert_eq!(state.refund(), 0);
        assert!(!state.address_in_access_list(&BOB));
        assert!(!state.slot_in_access_list(&BOB, &Word::one()));
        assert_eq!(state.transient(&BOB, &Word::one()), Word::zero());
        assert_eq!(state.snapshot(), 0);

        // Committed state stays.
        state.revert_to_snapshot(0);
        assert_eq!(state.storage(&BOB, &Word::one()), Word::from(2u64));
        assert_eq!(state.balance(&ALICE), Word::from(5u64));
    }

    #[test]
    fn test_prepare_warms_before_kore_only_transient() {
        let mut state = MemoryState::new();
        state.set_transient(&ALICE, Word::one(), Word::one());
        let precompiles = [Address::precompile(1)];
        let rules = Rules::new(Word::one(), Fork::Magma);
        state.prepare(&rules, &ALICE, &ALICE, &BOB, None, &precompiles, &[]);
        assert!(!state.address_in_access_list(&ALICE));
        assert_eq!(state.transient(&ALICE, &Word::one()), Word::zero());

        let rules = Rules::new(Word::one(), Fork::Shanghai);
        state.prepare(&rules, &ALICE, &ALICE, &BOB, None, &precompiles, &[]);
        assert!(state.address_in_access_list(&ALICE));
        assert!(state.address_in_access_list(&BOB));
        assert!(state.address_in_access_list(&precompiles[0]));
    }
}
