mod common;

use common::*;
use ledgervm::{
    Address, Message, ReceiptStatus, Word, apply_message,
    common::{account::VmVersion, address::addr, hash::sha256},
    config::{Fork, VmConfig},
    contract::Contract,
    executor::Evm,
    interpreter::Halt,
    message::TxPayload,
    state::{MemoryState, StateDb},
};
use pretty_assertions::assert_eq;

const ALICE: Address = addr("0x00000000000000000000000000000000000a11ce");
const CAROL: Address = addr("0x000000000000000000000000000000000000ca01");
const LEGACY_CONTRACT: Address = addr("0x0000000000000000000000000000000000000a0a");
const MODERN_CONTRACT: Address = addr("0x0000000000000000000000000000000000000b0b");

fn call(to: Address, data: &[u8], fork: Fork) -> eyre::Result<Message> {
    Ok(Message::call(to, data)
        .with_sender(ALICE)
        .with_gas(100_000)
        .with_gas_price(Word::one())
        .ready(&rules(fork))?)
}

/// Calls the precompile at `0x0a` and returns `success ++ output`.
fn call_slot_0a(evm: &mut Evm<'_>, contract: &mut Contract, _: &[u8]) -> Result<Vec<u8>, Halt> {
    let kzg = Address::precompile(0x0a);
    let result = evm.call(contract.address, kzg, &[], 50_000, Word::zero());
    let mut out = vec![result.is_success() as u8];
    out.extend(result.output);
    Ok(out)
}

/// Calls the fee payer routine at its current address.
fn ask_fee_payer(evm: &mut Evm<'_>, contract: &mut Contract, _: &[u8]) -> Result<Vec<u8>, Halt> {
    let fee_payer = Address::precompile(0x3fe);
    let result = evm.call(contract.address, fee_payer, &[], 1_000, Word::zero());
    Ok(result.output)
}

#[test]
fn test_sha256_message_call() -> eyre::Result<()> {
    init_tracing();
    let mut state = MemoryState::new().with_balance(ALICE, Word::from(ETHER));
    let msg = call(Address::precompile(0x02), b"abc", Fork::Osaka)?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, ScriptInterpreter::new());
        apply_message(&mut evm, &msg)?
    };

    assert_eq!(result.status, ReceiptStatus::Successful);
    assert_eq!(result.output(), Some(&sha256(b"abc")[..]));
    assert_eq!(result.used_gas, 21_000 + 3 * 16 + 60 + 12);
    Ok(())
}

#[test]
fn test_identity_echoes_input() -> eyre::Result<()> {
    let mut state = MemoryState::new().with_balance(ALICE, Word::from(ETHER));
    let msg = call(Address::precompile(0x04), &[1, 0, 2], Fork::Osaka)?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, ScriptInterpreter::new());
        apply_message(&mut evm, &msg)?
    };
    assert_eq!(result.output(), Some(&[1, 0, 2][..]));
    Ok(())
}

#[test]
fn test_value_to_precompile_is_rejected() -> eyre::Result<()> {
    let mut state = MemoryState::new().with_balance(ALICE, Word::from(ETHER));
    let msg = Message::call(Address::precompile(0x02), &[])
        .with_sender(ALICE)
        .with_gas(100_000)
        .with_gas_price(Word::one())
        .with_value(Word::one())
        .ready(&rules(Fork::Osaka))?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, ScriptInterpreter::new());
        apply_message(&mut evm, &msg)?
    };

    assert_eq!(result.status, ReceiptStatus::ErrPrecompiledContractAddress);
    assert_eq!(result.used_gas, 21_000);
    assert_eq!(state.balance(&ALICE), Word::from(ETHER - 21_000));
    Ok(())
}

#[test]
fn test_unassigned_reserved_address() -> eyre::Result<()> {
    let mut state = MemoryState::new().with_balance(ALICE, Word::from(ETHER));
    let msg = call(Address::precompile(0x200), &[], Fork::Osaka)?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, ScriptInterpreter::new());
        apply_message(&mut evm, &msg)?
    };
    assert_eq!(result.status, ReceiptStatus::ErrPrecompiledContractAddress);
    assert_eq!(result.status.code(), 0x20);
    assert_eq!(result.used_gas, 21_000);
    Ok(())
}

#[test]
fn test_rejected_input_burns_gas() -> eyre::Result<()> {
    let mut state = MemoryState::new().with_balance(ALICE, Word::from(ETHER));
    let msg = call(Address::precompile(0x0a), &[0x01], Fork::Osaka)?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, ScriptInterpreter::new());
        apply_message(&mut evm, &msg)?
    };
    assert_eq!(result.status, ReceiptStatus::ErrDefault);
    assert_eq!(result.used_gas, 100_000);
    Ok(())
}

#[test]
fn test_computation_cost_limit() -> eyre::Result<()> {
    let mut state = MemoryState::new().with_balance(ALICE, Word::from(ETHER));
    let msg = call(Address::precompile(0x01), &[], Fork::Osaka)?;
    let config = VmConfig {
        computation_cost_limit: Some(100_000),
        ..Default::default()
    };
    let result = {
        let interpreter = ScriptInterpreter::new();
        let mut evm = engine_with(&mut state, Fork::Osaka, block(0), config, interpreter);
        apply_message(&mut evm, &msg)?
    };
    assert_eq!(
        result.status,
        ReceiptStatus::ErrOpcodeComputationCostLimitReached
    );
    assert_eq!(result.used_gas, 100_000);
    Ok(())
}

#[test]
fn test_version_zero_contract_keeps_genesis_layout() -> eyre::Result<()> {
    let interpreter = ScriptInterpreter::new()
        .with(&[0x0a, 0x00], call_slot_0a)
        .with(&[0x0a, 0x01], call_slot_0a);
    let mut state = MemoryState::new()
        .with_balance(ALICE, Word::from(ETHER))
        .with_contract(LEGACY_CONTRACT, vec![0x0a, 0x00], VmVersion::V0)
        .with_contract(MODERN_CONTRACT, vec![0x0a, 0x01], VmVersion::V1);
    let legacy = call(LEGACY_CONTRACT, &[], Fork::Kaia)?;
    let modern = Message {
        nonce: 1,
        ..call(MODERN_CONTRACT, &[], Fork::Kaia)?
    };
    let (legacy, modern) = {
        let mut evm = engine(&mut state, Fork::Kaia, interpreter);
        (apply_message(&mut evm, &legacy)?, apply_message(&mut evm, &modern)?)
    };

    // Version zero code reaches feePayer; newer code hits the KZG routine
    // and its input check.
    let mut fee_payer = vec![1];
    fee_payer.extend(ALICE.as_word().into_bytes());
    assert_eq!(legacy.output(), Some(&fee_payer[..]));
    assert_eq!(modern.output(), Some(&[0][..]));
    Ok(())
}

#[test]
fn test_fee_payer_of_delegated_message() -> eyre::Result<()> {
    let contract = addr("0x000000000000000000000000000000000000c0de");
    let interpreter = ScriptInterpreter::new().with(&[0xfe], ask_fee_payer);
    let mut state = MemoryState::new()
        .with_balance(ALICE, Word::from(ETHER))
        .with_balance(CAROL, Word::from(ETHER))
        .with_contract(contract, vec![0xfe], VmVersion::V1);
    let msg = Message::builder(TxPayload::SmartContractExecution, Some(contract))
        .with_sender(ALICE)
        .with_gas(100_000)
        .with_gas_price(Word::one())
        .with_fee_payer(CAROL)
        .ready(&rules(Fork::Osaka))?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, interpreter);
        apply_message(&mut evm, &msg)?
    };

    assert_eq!(result.status, ReceiptStatus::Successful);
    assert_eq!(result.output(), Some(&CAROL.as_word().into_bytes()[..]));
    assert_eq!(state.balance(&ALICE), Word::from(ETHER));
    assert!(state.balance(&CAROL) < Word::from(ETHER));
    Ok(())
}
