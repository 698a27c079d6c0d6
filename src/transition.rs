//! Per-message state transition: validation, gas purchase, execution,
//! refunds and fee crediting.

use crate::{
    authorization::{apply_authorization, parse_delegation},
    common::{Address, Word, block::TxContext},
    config::Fork,
    error::{ReceiptStatus, TxError, VmError},
    executor::{Evm, MAX_INIT_CODE_SIZE},
    message::Message,
    precompiles::active_precompiles,
};

const REFUND_QUOTIENT: u64 = 2;
/// Refund quotient once `Kore` is active (EIP-3529).
const REFUND_QUOTIENT_KORE: u64 = 5;

/// Outcome of an included message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub used_gas: u64,
    pub status: ReceiptStatus,
    pub err: Option<VmError>,
    pub return_data: Vec<u8>,
}

impl ExecutionResult {
    fn new(used_gas: u64, err: Option<VmError>, return_data: Vec<u8>) -> Self {
        Self {
            used_gas,
            status: ReceiptStatus::from_error(err.as_ref()),
            err,
            return_data,
        }
    }

    /// The VM fault, if any.
    pub fn error(&self) -> Option<&VmError> {
        self.err.as_ref()
    }

    pub fn failed(&self) -> bool {
        !self.status.is_success()
    }

    /// Output of a successful message.
    pub fn output(&self) -> Option<&[u8]> {
        (!self.failed()).then_some(self.return_data.as_slice())
    }

    /// Revert payload, present only for reverted messages.
    pub fn revert(&self) -> Option<&[u8]> {
        (self.status == ReceiptStatus::ErrExecutionReverted).then_some(self.return_data.as_slice())
    }
}

/// Splits `fee` into the fee payer's and the sender's portions. Without a
/// ratio the fee payer covers everything.
pub fn split_fee(fee: Word, ratio: Option<u8>) -> (Word, Word) {
    let Some(ratio) = ratio else {
        return (fee, Word::zero());
    };
    let ratio = u64::from(ratio.min(100));
    let fee_payer = fee.mul_div(ratio, 100).unwrap_or(fee);
    (fee_payer, fee - fee_payer)
}

/// Applies `msg` to the engine's state. `Err` means the message cannot be
/// included and the state is left as it was.
pub fn apply_message(evm: &mut Evm<'_>, msg: &Message) -> Result<ExecutionResult, TxError> {
    let gas_price = msg.effective_gas_price(evm.block.base_fee, &evm.rules);
    evm.reset(TxContext {
        origin: msg.validated_sender(),
        gas_price,
        fee_payer: msg.validated_fee_payer(),
    });

    evm.trace_tx_start(msg.gas_limit);
    let snapshot = evm.state_mut().snapshot();
    let mut st = StateTransition::new(evm, msg, gas_price);
    let result = st.transition_db();
    let rest_gas = st.gas;
    match &result {
        Ok(_) => evm.trace_tx_end(rest_gas),
        Err(err) => {
            tracing::debug!(sender = %msg.from, %err, "message rejected");
            evm.state_mut().revert_to_snapshot(snapshot);
        }
    }
    result
}

/// Transient per-message state. After `buy_gas`,
/// `initial_gas == gas_used() + gas` always holds.
pub struct StateTransition<'e, 'a> {
    evm: &'e mut Evm<'a>,
    msg: &'e Message,
    gas_price: Word,
    initial_gas: u64,
    gas: u64,
}

impl<'e, 'a> StateTransition<'e, 'a> {
    pub fn new(evm: &'e mut Evm<'a>, msg: &'e Message, gas_price: Word) -> Self {
        Self {
            evm,
            msg,
            gas_price,
            initial_gas: 0,
            gas: 0,
        }
    }

    pub fn gas_used(&self) -> u64 {
        self.initial_gas - self.gas
    }

    fn sender(&self) -> Address {
        self.msg.validated_sender()
    }

    fn fee_payer(&self) -> Address {
        self.msg.validated_fee_payer()
    }

    fn pre_check(&mut self) -> Result<(), TxError> {
        if self.evm.config.prefetching {
            self.gas = self.msg.gas_limit;
            self.initial_gas = self.msg.gas_limit;
            return Ok(());
        }

        let msg = self.msg;
        msg.validate(self.evm.state(), &self.evm.rules)?;

        let sender = self.sender();
        let state_nonce = self.evm.state().nonce(&sender);
        if state_nonce < msg.nonce {
            return Err(TxError::NonceTooHigh {
                address: sender,
                tx: msg.nonce,
                state: state_nonce,
            });
        }
        if state_nonce > msg.nonce {
            return Err(TxError::NonceTooLow {
                address: sender,
                tx: msg.nonce,
                state: state_nonce,
            });
        }
        if state_nonce == u64::MAX {
            return Err(TxError::NonceMax(sender));
        }

        if self.evm.rules.is_magma() {
            let simulation = self.evm.config.no_base_fee
                && msg.gas_fee_cap.is_zero()
                && msg.gas_tip_cap.is_zero();
            if !simulation {
                if msg.gas_tip_cap > msg.gas_fee_cap {
                    return Err(TxError::TipAboveFeeCap {
                        tip: msg.gas_tip_cap,
                        fee_cap: msg.gas_fee_cap,
                    });
                }
                if msg.gas_fee_cap < self.evm.block.base_fee {
                    return Err(TxError::FeeCapTooLow {
                        fee_cap: msg.gas_fee_cap,
                        base_fee: self.evm.block.base_fee,
                    });
                }
            }
        }

        if msg.payload.is_set_code() {
            if msg.to.is_none() {
                return Err(TxError::SetCodeTxCreate);
            }
            if msg.authorizations().is_empty() {
                return Err(TxError::EmptyAuthList);
            }
        }

        self.buy_gas()
    }

    fn buy_gas(&mut self) -> Result<(), TxError> {
        let fee = Word::from(self.msg.gas_limit)
            .checked_mul(self.gas_price)
            .ok_or(TxError::GasUintOverflow)?;
        let (sender, fee_payer) = (self.sender(), self.fee_payer());
        let (fee_payer_part, sender_part) = split_fee(fee, self.msg.fee_ratio());

        let state = self.evm.state();
        let fee_payer_balance = state.balance(&fee_payer);
        if fee_payer_balance < fee_payer_part {
            tracing::debug!(
                %fee_payer,
                %fee_payer_balance,
                %fee_payer_part,
                "fee payer cannot buy gas"
            );
            return Err(if fee_payer == sender {
                TxError::InsufficientFundsForGas {
                    address: sender,
                    have: fee_payer_balance,
                    want: fee_payer_part,
                }
            } else {
                TxError::FeePayerInsufficientFunds {
                    address: fee_payer,
                    have: fee_payer_balance,
                    want: fee_payer_part,
                }
            });
        }
        let sender_balance = state.balance(&sender);
        if sender_balance < sender_part {
            tracing::debug!(%sender, %sender_balance, %sender_part, "sender cannot buy gas");
            return Err(TxError::InsufficientFundsForGas {
                address: sender,
                have: sender_balance,
                want: sender_part,
            });
        }

        let state = self.evm.state_mut();
        for (payer, part) in [(fee_payer, fee_payer_part), (sender, sender_part)] {
            if !part.is_zero() {
                state.sub_balance(&payer, part);
            }
        }
        self.gas = self.msg.gas_limit;
        self.initial_gas = self.msg.gas_limit;
        Ok(())
    }

    /// Runs the message to completion. Type-specific validation, gas purchase
    /// and execution happen here in that order.
    pub fn transition_db(&mut self) -> Result<ExecutionResult, TxError> {
        self.pre_check()?;

        let msg = self.msg;
        let rules = self.evm.rules;
        let sender = self.sender();

        let intrinsic = msg.gas.total();
        if self.gas < intrinsic {
            return Err(TxError::IntrinsicGas {
                have: self.gas,
                want: intrinsic,
            });
        }
        let floor = msg.gas.floor_data_gas();
        if rules.is_prague() && msg.gas_limit < floor {
            return Err(TxError::FloorDataGas {
                have: msg.gas_limit,
                want: floor,
            });
        }
        self.gas -= intrinsic;

        if !msg.value.is_zero() && !self.evm.can_transfer(&sender, msg.value) {
            return Err(TxError::InsufficientFundsForTransfer(sender));
        }

        let coinbase = self.evm.block.coinbase;
        let fee_payer = self.fee_payer();
        let precompiles = active_precompiles(&rules);
        self.evm.state_mut().prepare(
            &rules,
            &sender,
            &fee_payer,
            &coinbase,
            msg.to.as_ref(),
            &precompiles,
            &msg.access_list,
        );

        if !msg.is_create() {
            self.apply_authorizations();
        }

        if msg.is_create()
            && rules.is_active(Fork::Shanghai)
            && msg.data.len() > MAX_INIT_CODE_SIZE
        {
            return Err(TxError::MaxInitCodeSizeExceeded {
                size: msg.data.len(),
                limit: MAX_INIT_CODE_SIZE,
            });
        }

        let result = msg.execute(self.evm, self.gas, msg.value);
        if result.err == Some(VmError::TotalTimeLimitReached) {
            return Err(TxError::TotalTimeLimitReached);
        }
        self.gas = result.gas_left;

        self.refund_gas(floor);
        self.return_gas();
        self.credit_fee();

        Ok(ExecutionResult::new(self.gas_used(), result.err, result.output))
    }

    /// Bumps the set-code sender nonce, then applies each tuple in order.
    /// Invalid tuples are skipped.
    fn apply_authorizations(&mut self) {
        let msg = self.msg;
        let sender = self.sender();
        let rules = self.evm.rules;
        let state = self.evm.state_mut();

        if msg.payload.is_set_code() {
            state.increment_nonce(&sender);
        }
        for auth in msg.authorizations() {
            match apply_authorization(&mut *state, &rules.chain_id, auth) {
                Ok(authority) => {
                    tracing::trace!(%authority, target = %auth.address, "authorization applied")
                }
                Err(err) => tracing::debug!(target = %auth.address, %err, "authorization skipped"),
            }
        }

        if rules.is_prague()
            && let Some(to) = msg.to
            && let Some(target) = parse_delegation(&state.code(&to))
        {
            state.add_address_to_access_list(&target);
        }
    }

    fn refund_gas(&mut self, floor: u64) {
        let quotient = if self.evm.rules.is_active(Fork::Kore) {
            REFUND_QUOTIENT_KORE
        } else {
            REFUND_QUOTIENT
        };
        let refund = (self.gas_used() / quotient).min(self.evm.state().refund());
        self.gas += refund;

        if self.evm.rules.is_prague() && self.gas_used() < floor {
            self.gas = self.initial_gas.saturating_sub(floor);
        }
    }

    /// Credits unused gas back with the same split used to buy it.
    fn return_gas(&mut self) {
        if self.evm.config.prefetching {
            return;
        }
        let remaining = Word::from(self.gas) * self.gas_price;
        let (fee_payer_part, sender_part) = split_fee(remaining, self.msg.fee_ratio());
        let (sender, fee_payer) = (self.sender(), self.fee_payer());
        let state = self.evm.state_mut();
        for (payer, part) in [(fee_payer, fee_payer_part), (sender, sender_part)] {
            if !part.is_zero() {
                state.add_balance(&payer, part);
            }
        }
    }

    fn credit_fee(&mut self) {
        if self.evm.config.prefetching || self.evm.chain.deferred_tx_fee {
            return;
        }
        let recipient = if self.evm.rules.is_magma() {
            self.evm.block.rewardbase
        } else {
            self.evm.block.coinbase
        };
        let fee = Word::from(self.gas_used()) * self.gas_price;
        if !fee.is_zero() {
            self.evm.state_mut().add_balance(&recipient, fee);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fee_is_exact() {
        let fee = Word::from(1_000_003u64);
        for ratio in 0..=100u8 {
            let (fee_payer, sender) = split_fee(fee, Some(ratio));
            assert_eq!(fee_payer + sender, fee);
        }
        assert_eq!(split_fee(fee, Some(30)), (Word::from(300_000u64), Word::from(700_003u64)));
        assert_eq!(split_fee(fee, None), (fee, Word::zero()));
        assert_eq!(split_fee(Word::max(), Some(100)), (Word::max(), Word::zero()));
    }

    #[test]
    fn test_execution_result_accessors() {
        let ok = ExecutionResult::new(21_000, None, vec![1, 2]);
        assert!(!ok.failed());
        assert_eq!(ok.output(), Some(&[1u8, 2][..]));
        assert_eq!(ok.revert(), None);

        let reverted = ExecutionResult::new(30_000, Some(VmError::ExecutionReverted), vec![3]);
        assert!(reverted.failed());
        assert_eq!(reverted.output(), None);
        assert_eq!(reverted.revert(), Some(&[3u8][..]));
        assert_eq!(reverted.status, ReceiptStatus::ErrExecutionReverted);

        let oog = ExecutionResult::new(50_000, Some(VmError::OutOfGas), vec![]);
        assert_eq!(oog.revert(), None);
        assert_eq!(oog.error(), Some(&VmError::OutOfGas));
        assert_eq!(oog.status.code(), 0x07);
    }
}
