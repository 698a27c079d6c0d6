use serde::Serialize;
use thiserror::Error;

use crate::common::{Address, Word, account::AccountKeyError};

/// Faults raised while a message is executing. The message is still
/// included; the receipt records the matching [`ReceiptStatus`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("VM error occurs while running smart contract")]
    Default,
    #[error("max call depth exceeded")]
    Depth,
    #[error("contract address collision")]
    ContractAddressCollision,
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,
    #[error("out of gas")]
    OutOfGas,
    #[error("write protection")]
    WriteProtection,
    #[error("execution reverted")]
    ExecutionReverted,
    #[error("reached the opcode computation cost limit")]
    ComputationCostLimitReached,
    #[error("account already exists")]
    AddressAlreadyExists,
    #[error("not a program account")]
    NotAProgramAccount,
    #[error("fee ratio is out of range [1, 99]")]
    FeeRatioOutOfRange,
    #[error(transparent)]
    AccountKey(#[from] AccountKeyError),
    #[error("a legacy transaction must be with a legacy account key")]
    LegacyTxMustBeWithLegacyKey,
    #[error("insufficient balance for transfer")]
    InsufficientBalance,
    #[error("precompiled contract address")]
    PrecompiledContractAddress,
    #[error("invalid code: must not begin with 0xef")]
    InvalidCode,
    #[error("failed to set code")]
    FailedOnSetCode,
    #[error("nonce uint64 overflow")]
    NonceUintOverflow,
    #[error("precompile failed: {0}")]
    Precompile(#[from] PrecompileError),
    #[error("total time limit reached")]
    TotalTimeLimitReached,
    /// Interpreter faults without a dedicated status (invalid opcode, stack underflow, ...).
    #[error("{0}")]
    Halt(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrecompileError {
    #[error("invalid input length")]
    InvalidInputLength,
    #[error("field element is not canonical")]
    InvalidFieldElement,
    #[error("point is not on curve")]
    PointNotOnCurve,
    #[error("point is not in the prime order subgroup")]
    PointNotInSubgroup,
    #[error("invalid final flag")]
    InvalidFinalFlag,
    #[error("invalid versioned hash")]
    InvalidVersionedHash,
    #[error("invalid proof")]
    InvalidProof,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

/// Errors that make a message unincludable. No state is changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("nonce too high: address {address}, tx: {tx} state: {state}")]
    NonceTooHigh { address: Address, tx: u64, state: u64 },
    #[error("nonce too low: address {address}, tx: {tx} state: {state}")]
    NonceTooLow { address: Address, tx: u64, state: u64 },
    #[error("nonce has max value: address {0}")]
    NonceMax(Address),
    #[error("insufficient funds for gas * price + value: address {address} have {have} want {want}")]
    InsufficientFundsForGas { address: Address, have: Word, want: Word },
    #[error("fee payer insufficient funds for gas * price: address {address} have {have} want {want}")]
    FeePayerInsufficientFunds { address: Address, have: Word, want: Word },
    #[error("insufficient funds for transfer: address {0}")]
    InsufficientFundsForTransfer(Address),
    #[error("intrinsic gas too low: have {have}, want {want}")]
    IntrinsicGas { have: u64, want: u64 },
    #[error("insufficient gas for floor data gas cost: have {have}, want {want}")]
    FloorDataGas { have: u64, want: u64 },
    #[error("max fee per gas less than block base fee: maxFeePerGas: {fee_cap}, baseFee: {base_fee}")]
    FeeCapTooLow { fee_cap: Word, base_fee: Word },
    #[error("max priority fee per gas higher than max fee per gas: tip: {tip}, cap: {fee_cap}")]
    TipAboveFeeCap { tip: Word, fee_cap: Word },
    #[error("value transfer to a program account: address {0}")]
    NotForProgramAccount(Address),
    #[error("message kind requires a recipient")]
    MissingRecipient,
    #[error("transaction type not supported")]
    TxTypeNotSupported,
    #[error("set code transaction must not be a create transaction")]
    SetCodeTxCreate,
    #[error("set code transaction with empty auth list")]
    EmptyAuthList,
    #[error("max initcode size exceeded: code size {size} limit {limit}")]
    MaxInitCodeSizeExceeded { size: usize, limit: usize },
    #[error("gas uint64 overflow")]
    GasUintOverflow,
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] VmError),
    #[error("total time limit reached")]
    TotalTimeLimitReached,
}

macro_rules! receipt_status_table {
    ($( $status:ident = $code:literal => $err:expr ),* $(,)?) => {
        /// Consensus-visible outcome code of a message.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
        #[repr(u8)]
        pub enum ReceiptStatus {
            Failed = 0x00,
            Successful = 0x01,
            ErrDefault = 0x02,
            $( $status = $code, )*
        }

        impl ReceiptStatus {
            /// Unknown errors degrade to [`ReceiptStatus::ErrDefault`].
            pub fn from_error(err: Option<&VmError>) -> Self {
                let Some(err) = err else {
                    return Self::Successful;
                };
                $(
                    if *err == $err {
                        return Self::$status;
                    }
                )*
                Self::ErrDefault
            }

            pub fn to_error(self) -> Option<VmError> {
                match self {
                    Self::Successful => None,
                    Self::Failed | Self::ErrDefault => Some(VmError::Default),
                    $( Self::$status => Some($err), )*
                }
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    0x00 => Some(Self::Failed),
                    0x01 => Some(Self::Successful),
                    0x02 => Some(Self::ErrDefault),
                    $( $code => Some(Self::$status), )*
                    _ => None,
                }
            }

            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn all() -> &'static [ReceiptStatus] {
                &[
                    Self::Failed,
                    Self::Successful,
                    Self::ErrDefault,
                    $( Self::$status, )*
                ]
            }
        }
    };
}

receipt_status_table! {
    ErrDepth = 0x03 => VmError::Depth,
    ErrContractAddressCollision = 0x04 => VmError::ContractAddressCollision,
    ErrCodeStoreOutOfGas = 0x05 => VmError::CodeStoreOutOfGas,
    ErrMaxCodeSizeExceed = 0x06 => VmError::MaxCodeSizeExceeded,
    ErrOutOfGas = 0x07 => VmError::OutOfGas,
    ErrWriteProtection = 0x08 => VmError::WriteProtection,
    ErrExecutionReverted = 0x09 => VmError::ExecutionReverted,
    ErrOpcodeComputationCostLimitReached = 0x0a => VmError::ComputationCostLimitReached,
    ErrAddressAlreadyExists = 0x0b => VmError::AddressAlreadyExists,
    ErrNotAProgramAccount = 0x0c => VmError::NotAProgramAccount,
    ErrFeeRatioOutOfRange = 0x0e => VmError::FeeRatioOutOfRange,
    ErrAccountKeyFailNotUpdatable = 0x0f => VmError::AccountKey(AccountKeyError::FailNotUpdatable),
    ErrDifferentAccountKeyType = 0x10 => VmError::AccountKey(AccountKeyError::DifferentType),
    ErrAccountKeyNilUninitializable = 0x11 => VmError::AccountKey(AccountKeyError::NilUninitializable),
    ErrZeroKeyWeight = 0x13 => VmError::AccountKey(AccountKeyError::ZeroKeyWeight),
    ErrDuplicatedKey = 0x15 => VmError::AccountKey(AccountKeyError::DuplicatedKey),
    ErrWeightedSumOverflow = 0x16 => VmError::AccountKey(AccountKeyError::WeightedSumOverflow),
    ErrUnsatisfiableThreshold = 0x17 => VmError::AccountKey(AccountKeyError::UnsatisfiableThreshold),
    ErrZeroLength = 0x18 => VmError::AccountKey(AccountKeyError::ZeroLength),
    ErrLengthTooLong = 0x19 => VmError::AccountKey(AccountKeyError::LengthTooLong),
    ErrNestedCompositeType = 0x1a => VmError::AccountKey(AccountKeyError::NestedCompositeType),
    ErrLegacyTransactionMustBeWithLegacyKey = 0x1b => VmError::LegacyTxMustBeWithLegacyKey,
    ErrInsufficientBalance = 0x1f => VmError::InsufficientBalance,
    ErrPrecompiledContractAddress = 0x20 => VmError::PrecompiledContractAddress,
    ErrInvalidCode = 0x21 => VmError::InvalidCode,
    ErrFailedOnSetCode = 0x22 => VmError::FailedOnSetCode,
    ErrNonceUintOverflow = 0x23 => VmError::NonceUintOverflow,
}

impl ReceiptStatus {
    pub fn is_success(self) -> bool {
        self == Self::Successful
    }
}
