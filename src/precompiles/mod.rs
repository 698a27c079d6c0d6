//! Native routines reachable at reserved addresses, grouped into one table
//! per fork milestone.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::{
    common::{Address, account::VmVersion},
    config::{Fork, Rules},
    contract::Contract,
    error::PrecompileError,
    executor::Evm,
};

pub mod bls12_381;
pub mod bn254;
pub mod hash;
pub mod kzg;
pub mod modexp;
pub mod p256;
pub mod system;

/// Consensus gas and the node-internal computation cost of one invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cost {
    pub gas: u64,
    pub computation: u64,
}

impl Cost {
    pub const fn new(gas: u64, computation: u64) -> Self {
        Self { gas, computation }
    }

    /// Routines whose computation cost tracks their gas.
    pub const fn flat(gas: u64) -> Self {
        Self::new(gas, gas)
    }
}

pub type CostFn = fn(&[u8]) -> Cost;
pub type PureFn = fn(&[u8]) -> Result<Vec<u8>, PrecompileError>;
pub type HostFn = fn(&[u8], &Contract, &Evm<'_>) -> Result<Vec<u8>, PrecompileError>;

#[derive(Clone, Copy)]
pub enum Routine {
    /// Depends on the input only.
    Pure(PureFn),
    /// Reads the calling frame or the engine (state, message context).
    Host(HostFn),
}

#[derive(Clone, Copy)]
pub struct Precompile {
    pub name: &'static str,
    cost: CostFn,
    routine: Routine,
}

impl std::fmt::Debug for Precompile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Precompile").field("name", &self.name).finish()
    }
}

impl Precompile {
    pub const fn pure(name: &'static str, cost: CostFn, run: PureFn) -> Self {
        Self {
            name,
            cost,
            routine: Routine::Pure(run),
        }
    }

    pub const fn host(name: &'static str, cost: CostFn, run: HostFn) -> Self {
        Self {
            name,
            cost,
            routine: Routine::Host(run),
        }
    }

    pub fn cost(&self, input: &[u8]) -> Cost {
        (self.cost)(input)
    }

    pub fn required_gas(&self, input: &[u8]) -> u64 {
        self.cost(input).gas
    }

    pub fn run(
        &self,
        input: &[u8],
        contract: &Contract,
        evm: &Evm<'_>,
    ) -> Result<Vec<u8>, PrecompileError> {
        tracing::trace!(name = self.name, len = input.len(), "precompile");
        match self.routine {
            Routine::Pure(run) => run(input),
            Routine::Host(run) => run(input, contract, evm),
        }
    }
}

/// Immutable address to routine map for one fork milestone.
#[derive(Clone, Debug, Default)]
pub struct PrecompileTable {
    fork: Fork,
    entries: BTreeMap<Address, Precompile>,
}

impl PrecompileTable {
    /// Builds the table introduced at `fork`. Forks without their own table
    /// resolve to the closest earlier milestone.
    pub fn build(fork: Fork) -> Self {
        let milestone = Self::milestone(fork);
        let mut table = Self {
            fork: milestone,
            entries: BTreeMap::new(),
        };
        if milestone == Fork::Genesis {
            table.genesis();
            return table;
        }

        table.istanbul();
        if milestone >= Fork::Cancun {
            table.insert(0x05, modexp::MODEXP_EIP2565);
            table.insert(0x0a, kzg::POINT_EVALUATION);
        }
        if milestone >= Fork::Prague {
            table.insert(0x0b, bls12_381::G1_ADD);
            table.insert(0x0c, bls12_381::G1_MSM);
            table.insert(0x0d, bls12_381::G2_ADD);
            table.insert(0x0e, bls12_381::G2_MSM);
            table.insert(0x0f, bls12_381::PAIRING);
            table.insert(0x10, bls12_381::MAP_FP_TO_G1);
            table.insert(0x11, bls12_381::MAP_FP2_TO_G2);
        }
        if milestone >= Fork::Osaka {
            table.insert(0x100, p256::P256_VERIFY);
        }
        table
    }

    fn milestone(fork: Fork) -> Fork {
        match fork {
            Fork::Osaka => Fork::Osaka,
            Fork::Prague => Fork::Prague,
            Fork::Cancun | Fork::Kaia => Fork::Cancun,
            Fork::Genesis => Fork::Genesis,
            _ => Fork::Istanbul,
        }
    }

    fn genesis(&mut self) {
        self.insert(0x01, hash::ECRECOVER);
        self.insert(0x02, hash::SHA256);
        self.insert(0x03, hash::RIPEMD160);
        self.insert(0x04, hash::IDENTITY);
        self.insert(0x05, modexp::MODEXP_EIP198);
        self.insert(0x06, bn254::ADD_GENESIS);
        self.insert(0x07, bn254::MUL_GENESIS);
        self.insert(0x08, bn254::PAIRING_GENESIS);
        self.insert(0x09, system::VM_LOG);
        self.insert(0x0a, system::FEE_PAYER);
        self.insert(0x0b, system::VALIDATE_SENDER);
    }

    fn istanbul(&mut self) {
        self.insert(0x01, hash::ECRECOVER);
        self.insert(0x02, hash::SHA256);
        self.insert(0x03, hash::RIPEMD160);
        self.insert(0x04, hash::IDENTITY);
        self.insert(0x05, modexp::MODEXP_EIP198);
        self.insert(0x06, bn254::ADD_ISTANBUL);
        self.insert(0x07, bn254::MUL_ISTANBUL);
        self.insert(0x08, bn254::PAIRING_ISTANBUL);
        self.insert(0x09, hash::BLAKE2F);
        self.insert(0x3fd, system::VM_LOG);
        self.insert(0x3fe, system::FEE_PAYER);
        self.insert(0x3ff, system::VALIDATE_SENDER);
    }

    fn insert(&mut self, index: u16, precompile: Precompile) {
        self.entries.insert(Address::precompile(index), precompile);
    }

    pub fn fork(&self) -> Fork {
        self.fork
    }

    pub fn get(&self, address: &Address) -> Option<&Precompile> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GENESIS: Lazy<PrecompileTable> = Lazy::new(|| PrecompileTable::build(Fork::Genesis));
static ISTANBUL: Lazy<PrecompileTable> = Lazy::new(|| PrecompileTable::build(Fork::Istanbul));
static CANCUN: Lazy<PrecompileTable> = Lazy::new(|| PrecompileTable::build(Fork::Cancun));
static PRAGUE: Lazy<PrecompileTable> = Lazy::new(|| PrecompileTable::build(Fork::Prague));
static OSAKA: Lazy<PrecompileTable> = Lazy::new(|| PrecompileTable::build(Fork::Osaka));

/// Table for calls made from an account running under `version`. Contracts
/// deployed before Istanbul carry [`VmVersion::V0`] and always see the
/// genesis table.
pub fn table(rules: &Rules, version: Option<VmVersion>) -> &'static PrecompileTable {
    if version == Some(VmVersion::V0) {
        return &GENESIS;
    }
    match PrecompileTable::milestone(rules.fork) {
        Fork::Osaka => &OSAKA,
        Fork::Prague => &PRAGUE,
        Fork::Cancun => &CANCUN,
        Fork::Genesis => &GENESIS,
        _ => &ISTANBUL,
    }
}

/// Addresses pre-warmed for a message under `rules`.
pub fn active_precompiles(rules: &Rules) -> Vec<Address> {
    table(rules, None).addresses()
}

pub(crate) fn words(len: usize) -> u64 {
    len.div_ceil(32) as u64
}

/// `input[start..start + len]`, right-padded with zeros where the input is short.
pub(crate) fn get_data(input: &[u8], start: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if start < input.len() {
        let end = start.saturating_add(len).min(input.len());
        out[..end - start].copy_from_slice(&input[start..end]);
    }
    out
}

/// 32-byte big-endian `1` or `0`.
pub(crate) fn bool_word(value: bool) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[31] = value as u8;
    out
}
