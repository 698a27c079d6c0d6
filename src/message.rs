//! Transaction kinds as seen by the state transition: who pays, how much
//! intrinsic gas they owe, and what executing them means.

use serde::{Deserialize, Serialize};

use crate::{
    authorization::{Authorization, PER_EMPTY_ACCOUNT_COST},
    common::{Address, Word, account::AccountKey, block::AccessTuple},
    config::{Fork, Rules},
    error::{TxError, VmError},
    executor::{CallResult, Evm},
    precompiles::words,
    state::StateDb,
};

pub const TX_GAS: u64 = 21_000;
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;
/// Flat per-byte payload price before `Istanbul`.
pub const TX_DATA_GAS: u64 = 100;
pub const INIT_CODE_WORD_GAS: u64 = 2;
pub const ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;
pub const ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;
pub const TX_GAS_FEE_DELEGATED: u64 = 10_000;
pub const TX_GAS_FEE_DELEGATED_WITH_RATIO: u64 = 15_000;
pub const TX_VALIDATION_GAS_PER_KEY: u64 = 15_000;
pub const CHAIN_DATA_ANCHORING_GAS: u64 = 100;
pub const TOTAL_COST_FLOOR_PER_TOKEN: u64 = 10;
const TOKENS_PER_NON_ZERO_BYTE: u64 = 4;

/// Who covers the fee when it is not the sender alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeeDelegation {
    Full { fee_payer: Address },
    /// `ratio` is the fee payer's share in percent.
    Partial { fee_payer: Address, ratio: u8 },
}

impl FeeDelegation {
    pub fn fee_payer(&self) -> Address {
        match self {
            FeeDelegation::Full { fee_payer } | FeeDelegation::Partial { fee_payer, .. } => {
                *fee_payer
            }
        }
    }

    pub fn ratio(&self) -> Option<u8> {
        match self {
            FeeDelegation::Full { .. } => None,
            FeeDelegation::Partial { ratio, .. } => Some(*ratio),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TxPayload {
    #[default]
    Legacy,
    EthereumAccessList,
    EthereumDynamicFee,
    EthereumSetCode {
        authorizations: Vec<Authorization>,
    },
    ValueTransfer,
    ValueTransferMemo,
    SmartContractDeploy,
    SmartContractExecution,
    AccountUpdate {
        key: AccountKey,
    },
    Cancel,
    ChainDataAnchoring {
        data: Vec<u8>,
    },
}

impl TxPayload {
    pub fn is_ethereum(&self) -> bool {
        matches!(
            self,
            TxPayload::Legacy
                | TxPayload::EthereumAccessList
                | TxPayload::EthereumDynamicFee
                | TxPayload::EthereumSetCode { .. }
        )
    }

    pub fn has_dynamic_fee(&self) -> bool {
        matches!(
            self,
            TxPayload::EthereumDynamicFee | TxPayload::EthereumSetCode { .. }
        )
    }

    pub fn is_set_code(&self) -> bool {
        matches!(self, TxPayload::EthereumSetCode { .. })
    }

    /// Kinds that deploy a contract when sent without a recipient.
    fn may_create(&self) -> bool {
        matches!(
            self,
            TxPayload::Legacy
                | TxPayload::EthereumAccessList
                | TxPayload::EthereumDynamicFee
                | TxPayload::SmartContractDeploy
        )
    }

    /// Kinds that send value to a recipient.
    fn needs_recipient(&self) -> bool {
        matches!(
            self,
            TxPayload::ValueTransfer
                | TxPayload::ValueTransferMemo
                | TxPayload::SmartContractExecution
        )
    }
}

/// Gas owed before any code runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntrinsicGas {
    pub intrinsic: u64,
    /// Extra signing keys of the sender and fee payer.
    pub signature_validation: u64,
    /// EIP-7623 data tokens: zero bytes count one, other bytes four.
    pub tokens: u64,
}

impl IntrinsicGas {
    pub fn total(&self) -> u64 {
        self.intrinsic.saturating_add(self.signature_validation)
    }

    pub fn floor_data_gas(&self) -> u64 {
        TX_GAS.saturating_add(self.tokens.saturating_mul(TOTAL_COST_FLOOR_PER_TOKEN))
    }
}

/// A validated transaction ready for execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub payload: TxPayload,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Word,
    pub gas_fee_cap: Word,
    pub gas_tip_cap: Word,
    pub value: Word,
    pub data: Vec<u8>,
    pub access_list: Vec<AccessTuple>,
    pub fee_delegation: Option<FeeDelegation>,
    pub gas: IntrinsicGas,
}

impl Message {
    /// Legacy call of `to`.
    pub fn call(to: Address, input: &[u8]) -> MessageBuilder {
        MessageBuilder::new(TxPayload::Legacy, Some(to)).with_data(input)
    }

    /// Legacy contract creation.
    pub fn create(code: &[u8]) -> MessageBuilder {
        MessageBuilder::new(TxPayload::Legacy, None).with_data(code)
    }

    pub fn transfer(to: Address, value: Word) -> MessageBuilder {
        MessageBuilder::new(TxPayload::ValueTransfer, Some(to)).with_value(value)
    }

    pub fn builder(payload: TxPayload, to: Option<Address>) -> MessageBuilder {
        MessageBuilder::new(payload, to)
    }

    pub fn validated_sender(&self) -> Address {
        self.from
    }

    pub fn validated_fee_payer(&self) -> Address {
        self.fee_delegation
            .map(|delegation| delegation.fee_payer())
            .unwrap_or(self.from)
    }

    pub fn fee_ratio(&self) -> Option<u8> {
        self.fee_delegation.and_then(|delegation| delegation.ratio())
    }

    pub fn is_create(&self) -> bool {
        self.to.is_none() && self.payload.may_create()
    }

    pub fn authorizations(&self) -> &[Authorization] {
        match &self.payload {
            TxPayload::EthereumSetCode { authorizations } => authorizations,
            _ => &[],
        }
    }

    /// Price per gas actually paid. Before `Magma` it is the signed price,
    /// until `Kaia` the base fee, afterwards base fee plus tip within the cap.
    pub fn effective_gas_price(&self, base_fee: Word, rules: &Rules) -> Word {
        if rules.is_active(Fork::Kaia) {
            let price = base_fee
                .checked_add(self.gas_tip_cap)
                .unwrap_or(Word::max());
            return price.min(self.gas_fee_cap);
        }
        if rules.is_magma() {
            return base_fee;
        }
        self.gas_price
    }

    /// Kind-specific checks against the pre-state.
    pub fn validate(&self, state: &dyn StateDb, rules: &Rules) -> Result<(), TxError> {
        let supported = match &self.payload {
            TxPayload::EthereumAccessList | TxPayload::EthereumDynamicFee => {
                rules.is_active(Fork::EthTxType)
            }
            TxPayload::EthereumSetCode { .. } => rules.is_prague(),
            _ => true,
        };
        if !supported {
            return Err(TxError::TxTypeNotSupported);
        }
        if self.payload.is_ethereum() && !state.key(&self.from).is_legacy() {
            return Err(VmError::LegacyTxMustBeWithLegacyKey.into());
        }
        if let Some(ratio) = self.fee_ratio()
            && !(1..=99).contains(&ratio)
        {
            return Err(VmError::FeeRatioOutOfRange.into());
        }
        if self.payload.needs_recipient() && self.to.is_none() {
            return Err(TxError::MissingRecipient);
        }
        match &self.payload {
            TxPayload::ValueTransfer | TxPayload::ValueTransferMemo => {
                if let Some(to) = &self.to
                    && state.is_program_account(to)
                {
                    return Err(TxError::NotForProgramAccount(*to));
                }
            }
            TxPayload::SmartContractExecution => {
                if let Some(to) = &self.to
                    && !state.is_program_account(to)
                {
                    return Err(VmError::NotAProgramAccount.into());
                }
            }
            TxPayload::AccountUpdate { key } if !key.is_composite() => {
                key.check_init().map_err(VmError::from)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Runs the message with `gas` left after intrinsic gas. Calls bump the
    /// sender nonce here; creations bump it inside the engine, set-code
    /// messages before their authorizations are applied.
    pub fn execute(&self, evm: &mut Evm<'_>, gas: u64, value: Word) -> CallResult {
        let sender = self.from;
        if self.is_create() {
            let result = evm.create(sender, &self.data, gas, value);
            return CallResult {
                output: result.output,
                gas_left: result.gas_left,
                err: result.err,
            };
        }

        if !self.payload.is_set_code() {
            evm.state_mut().increment_nonce(&sender);
        }
        match (&self.payload, self.to) {
            (TxPayload::AccountUpdate { key }, _) => {
                let current = evm.state().key(&sender);
                if let Err(err) = key.check_update(&current) {
                    return CallResult {
                        gas_left: gas,
                        err: Some(err.into()),
                        ..Default::default()
                    };
                }
                evm.state_mut().set_key(&sender, key.merged_into(&current));
                CallResult {
                    gas_left: gas,
                    ..Default::default()
                }
            }
            (TxPayload::Cancel | TxPayload::ChainDataAnchoring { .. }, _) => CallResult {
                gas_left: gas,
                ..Default::default()
            },
            (TxPayload::SmartContractExecution, Some(to))
                if !evm.state().is_program_account(&to) =>
            {
                CallResult {
                    gas_left: gas,
                    err: Some(VmError::NotAProgramAccount),
                    ..Default::default()
                }
            }
            (_, Some(to)) => evm.call(sender, to, &self.data, gas, value),
            // Recipient-less kinds that cannot create are rejected by `validate`.
            (_, None) => CallResult {
                gas_left: gas,
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    msg: Message,
    sender_keys: usize,
    fee_payer_keys: usize,
}

impl MessageBuilder {
    pub fn new(payload: TxPayload, to: Option<Address>) -> Self {
        Self {
            msg: Message {
                payload,
                to,
                ..Default::default()
            },
            sender_keys: 1,
            fee_payer_keys: 1,
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.msg.from = sender;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.msg.nonce = nonce;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.msg.gas_limit = gas;
        self
    }

    /// Legacy pricing: the fee cap and tip both equal the price.
    pub fn with_gas_price(mut self, price: Word) -> Self {
        self.msg.gas_price = price;
        self.msg.gas_fee_cap = price;
        self.msg.gas_tip_cap = price;
        self
    }

    pub fn with_fee_caps(mut self, fee_cap: Word, tip_cap: Word) -> Self {
        self.msg.gas_price = fee_cap;
        self.msg.gas_fee_cap = fee_cap;
        self.msg.gas_tip_cap = tip_cap;
        self
    }

    pub fn with_value(mut self, value: Word) -> Self {
        self.msg.value = value;
        self
    }

    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.msg.data = data.to_vec();
        self
    }

    pub fn with_access_list(mut self, access_list: Vec<AccessTuple>) -> Self {
        self.msg.access_list = access_list;
        self
    }

    pub fn with_fee_payer(mut self, fee_payer: Address) -> Self {
        self.msg.fee_delegation = Some(FeeDelegation::Full { fee_payer });
        self
    }

    pub fn with_fee_ratio(mut self, fee_payer: Address, ratio: u8) -> Self {
        self.msg.fee_delegation = Some(FeeDelegation::Partial { fee_payer, ratio });
        self
    }

    /// Number of keys that signed for the sender and for the fee payer.
    pub fn with_signers(mut self, sender_keys: usize, fee_payer_keys: usize) -> Self {
        self.sender_keys = sender_keys;
        self.fee_payer_keys = fee_payer_keys;
        self
    }

    /// Computes the intrinsic gas breakdown under `rules`.
    pub fn ready(self, rules: &Rules) -> Result<Message, TxError> {
        let Self {
            mut msg,
            sender_keys,
            fee_payer_keys,
        } = self;
        let fee_payer_keys = if msg.fee_delegation.is_some() {
            fee_payer_keys
        } else {
            1
        };
        msg.gas = intrinsic_gas(&msg, rules, sender_keys, fee_payer_keys)?;
        Ok(msg)
    }
}

fn intrinsic_gas(
    msg: &Message,
    rules: &Rules,
    sender_keys: usize,
    fee_payer_keys: usize,
) -> Result<IntrinsicGas, TxError> {
    let overflow = || TxError::GasUintOverflow;
    let mul = |a: u64, b: u64| a.checked_mul(b).ok_or_else(overflow);

    let zeros = msg.data.iter().filter(|byte| **byte == 0).count() as u64;
    let non_zeros = msg.data.len() as u64 - zeros;

    let mut gas = if msg.is_create() {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    let mut add = |extra: u64| -> Result<(), TxError> {
        gas = gas.checked_add(extra).ok_or_else(overflow)?;
        Ok(())
    };

    if rules.is_active(Fork::Istanbul) {
        add(mul(zeros, TX_DATA_ZERO_GAS)?)?;
        add(mul(non_zeros, TX_DATA_NON_ZERO_GAS)?)?;
    } else {
        add(mul(msg.data.len() as u64, TX_DATA_GAS)?)?;
    }
    if msg.is_create() && rules.is_active(Fork::Shanghai) {
        add(mul(words(msg.data.len()), INIT_CODE_WORD_GAS)?)?;
    }

    let keys: usize = msg.access_list.iter().map(|t| t.storage_keys.len()).sum();
    add(mul(msg.access_list.len() as u64, ACCESS_LIST_ADDRESS_GAS)?)?;
    add(mul(keys as u64, ACCESS_LIST_STORAGE_KEY_GAS)?)?;
    add(mul(msg.authorizations().len() as u64, PER_EMPTY_ACCOUNT_COST)?)?;

    match &msg.payload {
        TxPayload::AccountUpdate { key } => add(key.update_gas())?,
        TxPayload::ChainDataAnchoring { data } => {
            add(mul(data.len() as u64, CHAIN_DATA_ANCHORING_GAS)?)?
        }
        _ => {}
    }
    match msg.fee_delegation {
        Some(FeeDelegation::Full { .. }) => add(TX_GAS_FEE_DELEGATED)?,
        Some(FeeDelegation::Partial { .. }) => add(TX_GAS_FEE_DELEGATED_WITH_RATIO)?,
        None => {}
    }

    let extra_keys = sender_keys.saturating_sub(1) + fee_payer_keys.saturating_sub(1);
    Ok(IntrinsicGas {
        intrinsic: gas,
        signature_validation: mul(extra_keys as u64, TX_VALIDATION_GAS_PER_KEY)?,
        tokens: zeros + non_zeros * TOKENS_PER_NON_ZERO_BYTE,
    })
}
