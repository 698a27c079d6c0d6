pub mod authorization;
pub mod common;
pub mod config;
pub mod contract;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod message;
pub mod precompiles;
pub mod state;
pub mod tracer;
pub mod transition;

pub use crate::{
    common::{Address, Word},
    error::{ReceiptStatus, TxError, VmError},
    executor::Evm,
    message::Message,
    transition::{ExecutionResult, apply_message},
};
