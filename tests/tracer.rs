mod common;

use common::*;
use ledgervm::{
    Address, Message, ReceiptStatus, Word, apply_message,
    common::{Hex, account::VmVersion, address::addr},
    config::Fork,
    contract::Contract,
    executor::Evm,
    interpreter::Halt,
    state::MemoryState,
    tracer::{CallKind, CallTracer, Interrupt, TracerError},
};
use pretty_assertions::assert_eq;

const ALICE: Address = addr("0x00000000000000000000000000000000000a11ce");
const BOB: Address = addr("0x0000000000000000000000000000000000000b0b");
const OUTER: Address = addr("0x0000000000000000000000000000000000000a0a");
const INNER: Address = addr("0x0000000000000000000000000000000000000c0c");
const FAILING: Address = addr("0x0000000000000000000000000000000000000d0d");

const FORWARD: u64 = 10_000;

/// ABI encoding of `Error(reason)`.
fn revert_payload(reason: &str) -> Vec<u8> {
    let mut out = vec![0x08, 0xc3, 0x79, 0xa0];
    out.extend_from_slice(&Word::from(32u64).into_bytes());
    out.extend_from_slice(&Word::from(reason.len()).into_bytes());
    let mut data = reason.as_bytes().to_vec();
    data.resize(reason.len().div_ceil(32) * 32, 0);
    out.extend_from_slice(&data);
    out
}

fn outer(evm: &mut Evm<'_>, contract: &mut Contract, _: &[u8]) -> Result<Vec<u8>, Halt> {
    contract.use_gas(2 * FORWARD);
    let inner = evm.static_call(contract.address, INNER, &[0xaa], FORWARD);
    contract.refund_gas(inner.gas_left);
    let failing = evm.call(contract.address, FAILING, &[], FORWARD, Word::zero());
    contract.refund_gas(failing.gas_left);
    Ok(inner.output)
}

fn scripts() -> ScriptInterpreter {
    ScriptInterpreter::new()
        .with(&[0x01], outer)
        .with(&[0x02], |_, contract, _| {
            contract.use_gas(300);
            Ok(vec![0xbb])
        })
        .with(&[0x03], |_, contract, _| {
            contract.use_gas(700);
            Err(Halt::revert(revert_payload("nope")))
        })
}

fn contracts() -> MemoryState {
    MemoryState::new()
        .with_balance(ALICE, Word::from(ETHER))
        .with_contract(OUTER, vec![0x01], VmVersion::V1)
        .with_contract(INNER, vec![0x02], VmVersion::V1)
        .with_contract(FAILING, vec![0x03], VmVersion::V1)
}

fn call(to: Address, value: u64) -> eyre::Result<Message> {
    Ok(Message::call(to, &[])
        .with_sender(ALICE)
        .with_gas(100_000)
        .with_gas_price(Word::one())
        .with_value(Word::from(value))
        .ready(&rules(Fork::Osaka))?)
}

#[test]
fn test_call_tree() -> eyre::Result<()> {
    init_tracing();
    let mut state = contracts();
    let mut tracer = CallTracer::new();
    let msg = call(OUTER, 0)?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, scripts()).with_tracer(&mut tracer);
        apply_message(&mut evm, &msg)?
    };

    assert_eq!(result.status, ReceiptStatus::Successful);
    assert_eq!(result.used_gas, 21_000 + 1_000);

    let root = tracer.result()?;
    assert_eq!(root.kind, CallKind::Call);
    assert_eq!(root.from, ALICE);
    assert_eq!(root.to, Some(OUTER));
    assert_eq!(root.value, Some(Word::zero()));
    assert_eq!(root.gas, 100_000 - 21_000);
    assert_eq!(root.gas_used, result.used_gas);
    assert_eq!(root.output, Hex::from([0xbb]));
    assert_eq!(root.error, None);
    assert_eq!(root.calls.len(), 2);

    let inner = &root.calls[0];
    assert_eq!(inner.kind, CallKind::StaticCall);
    assert_eq!(inner.from, OUTER);
    assert_eq!(inner.to, Some(INNER));
    assert_eq!(inner.value, None);
    assert_eq!(inner.gas, FORWARD);
    assert_eq!(inner.gas_used, 300);
    assert_eq!(inner.input, Hex::from([0xaa]));
    assert_eq!(inner.output, Hex::from([0xbb]));

    let failing = &root.calls[1];
    assert_eq!(failing.kind, CallKind::Call);
    assert_eq!(failing.gas_used, 700);
    assert_eq!(failing.error.as_deref(), Some("execution reverted"));
    assert_eq!(failing.revert_reason.as_deref(), Some("nope"));
    assert_eq!(failing.output, Hex::from(revert_payload("nope")));

    let json = serde_json::to_value(&root)?;
    assert_eq!(json["type"], "CALL");
    assert_eq!(json["calls"][0]["type"], "STATICCALL");
    assert_eq!(json["calls"][1]["revertReason"], "nope");
    assert_eq!(json["gasUsed"], "0x55f0");
    Ok(())
}

#[test]
fn test_only_top_call() -> eyre::Result<()> {
    let mut state = contracts();
    let mut tracer = CallTracer::new().only_top_call();
    let msg = call(OUTER, 0)?;
    {
        let mut evm = engine(&mut state, Fork::Osaka, scripts()).with_tracer(&mut tracer);
        apply_message(&mut evm, &msg)?;
    }

    let root = tracer.result()?;
    assert_eq!(root.to, Some(OUTER));
    assert!(root.calls.is_empty());
    assert_eq!(root.output, Hex::from([0xbb]));
    Ok(())
}

#[test]
fn test_plain_transfer_has_a_root_frame() -> eyre::Result<()> {
    let mut state = contracts();
    let mut tracer = CallTracer::new();
    let msg = call(BOB, 5)?;
    {
        let mut evm = engine(&mut state, Fork::Osaka, scripts()).with_tracer(&mut tracer);
        apply_message(&mut evm, &msg)?;
    }

    let root = tracer.result()?;
    assert_eq!(root.to, Some(BOB));
    assert_eq!(root.value, Some(Word::from(5u64)));
    assert_eq!(root.gas_used, 21_000);
    assert!(root.calls.is_empty());
    Ok(())
}

#[test]
fn test_failed_creation_drops_the_recipient() -> eyre::Result<()> {
    let interpreter =
        ScriptInterpreter::new().with(&[0x21], |_, _, _| Err(Halt::revert(revert_payload("boom"))));
    let mut state = contracts();
    let mut tracer = CallTracer::new();
    let msg = Message::create(&[0x21])
        .with_sender(ALICE)
        .with_gas(100_000)
        .with_gas_price(Word::one())
        .ready(&rules(Fork::Osaka))?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, interpreter).with_tracer(&mut tracer);
        apply_message(&mut evm, &msg)?
    };

    assert_eq!(result.status, ReceiptStatus::ErrExecutionReverted);
    let root = tracer.result()?;
    assert_eq!(root.kind, CallKind::Create);
    assert_eq!(root.to, None);
    assert_eq!(root.revert_reason.as_deref(), Some("boom"));
    assert_eq!(root.gas_used, result.used_gas);
    Ok(())
}

#[test]
fn test_interrupt_from_another_thread() -> eyre::Result<()> {
    let mut tracer = CallTracer::new();
    let interrupt = tracer.interrupt();
    let interpreter = scripts().with(&[0x04], move |evm, contract, input| {
        let remote: Interrupt = interrupt.clone();
        std::thread::spawn(move || {
            remote.stop("timeout");
            remote.stop("ignored");
        })
        .join()
        .expect("stopper thread");
        outer(evm, contract, input)
    });
    let mut state = contracts().with_contract(BOB, vec![0x04], VmVersion::V1);
    let msg = call(BOB, 0)?;
    let result = {
        let mut evm = engine(&mut state, Fork::Osaka, interpreter).with_tracer(&mut tracer);
        apply_message(&mut evm, &msg)?
    };

    assert!(!result.failed());
    match tracer.result() {
        Err(TracerError::Interrupted { reason, partial }) => {
            assert_eq!(reason, "timeout");
            assert_eq!(partial.to, Some(BOB));
            assert!(partial.calls.is_empty());
        }
        other => panic!("expected an interrupted trace, got {other:?}"),
    }
    Ok(())
}
