//! Chain-specific routines that read the executing message or account keys.

use crate::{
    common::{Address, account::Role, signature::recover_rsv},
    contract::Contract,
    error::PrecompileError,
    executor::Evm,
    precompiles::{Cost, Precompile},
};

pub const VM_LOG: Precompile = Precompile::host("vmLog", vm_log_cost, vm_log);
pub const FEE_PAYER: Precompile = Precompile::host("feePayer", fee_payer_cost, fee_payer);
pub const VALIDATE_SENDER: Precompile =
    Precompile::host("validateSender", validate_sender_cost, validate_sender);

const VM_LOG_BASE_GAS: u64 = 100;
const VM_LOG_PER_BYTE_GAS: u64 = 20;
const FEE_PAYER_GAS: u64 = 300;
const VALIDATE_SENDER_GAS: u64 = 5000;
const VALIDATE_SENDER_COMPUTATION: u64 = 180_000;
const SIGNATURE_LENGTH: usize = 65;

fn vm_log_cost(input: &[u8]) -> Cost {
    let len = input.len() as u64;
    Cost::new(
        VM_LOG_BASE_GAS.saturating_add(len.saturating_mul(VM_LOG_PER_BYTE_GAS)),
        10u64.saturating_add(len),
    )
}

fn vm_log(input: &[u8], contract: &Contract, _: &Evm<'_>) -> Result<Vec<u8>, PrecompileError> {
    tracing::info!(
        address = %contract.address,
        message = %String::from_utf8_lossy(input),
        "vmLog"
    );
    Ok(Vec::new())
}

fn fee_payer_cost(_: &[u8]) -> Cost {
    Cost::new(FEE_PAYER_GAS, 10)
}

/// Fee payer of the executing message, left-padded to 32 bytes.
fn fee_payer(_: &[u8], _: &Contract, evm: &Evm<'_>) -> Result<Vec<u8>, PrecompileError> {
    Ok(evm.tx.fee_payer.as_word().into_bytes().to_vec())
}

fn validate_sender_cost(input: &[u8]) -> Cost {
    let signatures = (input.len() / SIGNATURE_LENGTH) as u64;
    Cost::new(
        signatures.saturating_mul(VALIDATE_SENDER_GAS),
        signatures.saturating_mul(VALIDATE_SENDER_COMPUTATION),
    )
}

/// `address(20) ++ hash(32) ++ signature(65)*`. Returns `[1]` when the
/// recovered signers satisfy the transaction role of the account's key,
/// `[0]` otherwise.
fn validate_sender(
    input: &[u8],
    _: &Contract,
    evm: &Evm<'_>,
) -> Result<Vec<u8>, PrecompileError> {
    let valid = check_signers(input, evm);
    if !valid {
        tracing::trace!("validateSender: signers rejected");
    }
    Ok(vec![valid as u8])
}

fn check_signers(input: &[u8], evm: &Evm<'_>) -> bool {
    if input.len() < 52 + SIGNATURE_LENGTH || (input.len() - 52) % SIGNATURE_LENGTH != 0 {
        return false;
    }
    let Ok(account) = Address::try_from(&input[..20]) else {
        return false;
    };
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&input[20..52]);

    let mut signers = Vec::with_capacity((input.len() - 52) / SIGNATURE_LENGTH);
    for signature in input[52..].chunks_exact(SIGNATURE_LENGTH) {
        match recover_rsv(&hash, signature) {
            Ok(signer) => signers.push(signer),
            Err(_) => return false,
        }
    }
    evm.state()
        .key(&account)
        .validate_signers(&account, &signers, Role::Transaction)
}
