#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use k256::ecdsa::SigningKey;
use ledgervm::{
    Address, Word,
    common::{address::addr, block::BlockContext, signature::public_key_to_address},
    config::{ChainConfig, Fork, Rules, VmConfig},
    contract::Contract,
    error::VmError,
    executor::Evm,
    interpreter::{Halt, Interpreter},
    state::MemoryState,
};

pub const CHAIN_ID: u64 = 8217;
pub const COINBASE: Address = addr("0x00000000000000000000000000000000c01bba5e");
pub const REWARDBASE: Address = addr("0x000000000000000000000000000000000000fee5");
pub const ETHER: u64 = 1_000_000_000_000_000_000;

type Script = Box<dyn Fn(&mut Evm<'_>, &mut Contract, &[u8]) -> Result<Vec<u8>, Halt> + Send + Sync>;

/// Runs Rust closures in place of bytecode, selected by the frame's code.
#[derive(Default)]
pub struct ScriptInterpreter {
    scripts: HashMap<Vec<u8>, Script>,
}

impl ScriptInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, code: &[u8], script: F) -> Self
    where
        F: Fn(&mut Evm<'_>, &mut Contract, &[u8]) -> Result<Vec<u8>, Halt> + Send + Sync + 'static,
    {
        self.scripts.insert(code.to_vec(), Box::new(script));
        self
    }
}

impl Interpreter for ScriptInterpreter {
    fn run(&self, evm: &mut Evm<'_>, contract: &mut Contract, input: &[u8]) -> Result<Vec<u8>, Halt> {
        match self.scripts.get(&contract.code) {
            Some(script) => script(evm, contract, input),
            None => Err(VmError::Halt(format!("no script for 0x{}", hex::encode(&contract.code))).into()),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn key(byte: u8) -> SigningKey {
    SigningKey::from_bytes(&[byte; 32].into()).expect("valid key")
}

pub fn address_of(key: &SigningKey) -> Address {
    public_key_to_address(key.verifying_key())
}

pub fn rules(fork: Fork) -> Rules {
    Rules::new(Word::from(CHAIN_ID), fork)
}

pub fn block(base_fee: u64) -> BlockContext {
    BlockContext {
        coinbase: COINBASE,
        rewardbase: REWARDBASE,
        gas_limit: 30_000_000,
        base_fee: Word::from(base_fee),
        ..Default::default()
    }
}

pub fn engine<'a>(
    state: &'a mut MemoryState,
    fork: Fork,
    interpreter: ScriptInterpreter,
) -> Evm<'a> {
    engine_with(state, fork, block(0), VmConfig::default(), interpreter)
}

pub fn engine_with<'a>(
    state: &'a mut MemoryState,
    fork: Fork,
    block: BlockContext,
    config: VmConfig,
    interpreter: ScriptInterpreter,
) -> Evm<'a> {
    Evm::new(
        block,
        ChainConfig::with_fork(CHAIN_ID, fork),
        config,
        state,
        Arc::new(interpreter),
    )
}

/// Big-endian word encoding of `n`, as a script would return it.
pub fn word_output(n: u64) -> Vec<u8> {
    Word::from(n).into_bytes().to_vec()
}
