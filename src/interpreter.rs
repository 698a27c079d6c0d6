use crate::{contract::Contract, error::VmError, executor::Evm};

/// Abnormal end of a frame. `output` is kept only for reverts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Halt {
    pub err: VmError,
    pub output: Vec<u8>,
}

impl Halt {
    pub fn revert(output: Vec<u8>) -> Self {
        Self {
            err: VmError::ExecutionReverted,
            output,
        }
    }
}

impl From<VmError> for Halt {
    fn from(err: VmError) -> Self {
        Self {
            err,
            output: Vec::new(),
        }
    }
}

/// The bytecode loop. It charges gas from `contract.gas`, reaches state
/// through the host helpers on [`Evm`], and re-enters the engine for nested
/// calls and creations.
pub trait Interpreter: Send + Sync {
    fn run(&self, evm: &mut Evm<'_>, contract: &mut Contract, input: &[u8])
    -> Result<Vec<u8>, Halt>;
}

/// Treats every program as `STOP`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StopInterpreter;

impl Interpreter for StopInterpreter {
    fn run(&self, _: &mut Evm<'_>, _: &mut Contract, _: &[u8]) -> Result<Vec<u8>, Halt> {
        Ok(Vec::new())
    }
}
