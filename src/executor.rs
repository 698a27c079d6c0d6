use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    authorization::parse_delegation,
    common::{
        Address, Word,
        account::{AccountKey, VmVersion},
        block::{BlockContext, TxContext},
        hash::{EMPTY_CODE_HASH, EMPTY_ROOT_HASH},
    },
    config::{ChainConfig, Fork, Rules, VmConfig},
    contract::Contract,
    error::VmError,
    interpreter::{Halt, Interpreter},
    precompiles::{self, Precompile, PrecompileTable},
    state::StateDb,
    tracer::{CallKind, Tracer},
};

pub const CALL_DEPTH_LIMIT: usize = 1024;
pub const MAX_CODE_SIZE: usize = 24_576;
pub const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;
/// Gas per byte of deployed code.
pub const CREATE_DATA_GAS: u64 = 200;

/// Outcome of a call frame. `gas_left` is what the caller gets back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallResult {
    pub output: Vec<u8>,
    pub gas_left: u64,
    pub err: Option<VmError>,
}

impl CallResult {
    fn ok(output: Vec<u8>, gas_left: u64) -> Self {
        Self {
            output,
            gas_left,
            err: None,
        }
    }

    fn fail(err: VmError, gas_left: u64) -> Self {
        Self {
            output: Vec::new(),
            gas_left,
            err: Some(err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateResult {
    pub output: Vec<u8>,
    pub address: Address,
    pub gas_left: u64,
    pub err: Option<VmError>,
}

impl CreateResult {
    fn fail(err: VmError, gas_left: u64) -> Self {
        Self {
            gas_left,
            err: Some(err),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}

/// Stops a running engine from another thread. The engine notices at the
/// next call boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            tracing::warn!("execution cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Call engine for one block. Not thread-safe: one message at a time.
pub struct Evm<'a> {
    pub block: BlockContext,
    pub tx: TxContext,
    pub chain: ChainConfig,
    pub rules: Rules,
    pub config: VmConfig,
    state: &'a mut dyn StateDb,
    interpreter: Arc<dyn Interpreter>,
    tracer: Option<&'a mut dyn Tracer>,
    depth: usize,
    read_only: bool,
    computation_cost: u64,
    cancel: CancelHandle,
}

impl<'a> Evm<'a> {
    pub fn new(
        block: BlockContext,
        chain: ChainConfig,
        config: VmConfig,
        state: &'a mut dyn StateDb,
        interpreter: Arc<dyn Interpreter>,
    ) -> Self {
        let rules = chain.rules(block.number);
        Self {
            block,
            tx: TxContext::default(),
            chain,
            rules,
            config,
            state,
            interpreter,
            tracer: None,
            depth: 0,
            read_only: false,
            computation_cost: 0,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_tracer(mut self, tracer: &'a mut dyn Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Prepares the engine for the next message of the block.
    pub fn reset(&mut self, tx: TxContext) {
        self.state.begin_message();
        self.tx = tx;
        self.depth = 0;
        self.read_only = false;
        self.computation_cost = 0;
    }

    pub fn state(&self) -> &dyn StateDb {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut dyn StateDb {
        &mut *self.state
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn computation_cost(&self) -> u64 {
        self.computation_cost
    }

    pub fn computation_cost_limit(&self) -> u64 {
        self.config
            .computation_cost_limit
            .unwrap_or_else(|| self.chain.computation_cost_limit(&self.rules))
    }

    /// Adds to the per-message computation cost, failing once it passes the limit.
    pub fn charge_computation(&mut self, cost: u64) -> Result<(), VmError> {
        self.computation_cost = self.computation_cost.saturating_add(cost);
        if self.computation_cost > self.computation_cost_limit() {
            return Err(VmError::ComputationCostLimitReached);
        }
        Ok(())
    }

    /// Precompiles visible to code running as `caller`.
    pub fn precompiles(&self, caller: &Address) -> &'static PrecompileTable {
        precompiles::table(&self.rules, self.state.vm_version(caller))
    }

    /// Code executed when `address` is called, following one delegation
    /// designation once `Prague` is active.
    pub fn resolve_code(&self, address: &Address) -> Vec<u8> {
        let code = self.state.code(address);
        if !self.rules.is_prague() {
            return code;
        }
        match parse_delegation(&code) {
            Some(target) => self.state.code(&target),
            None => code,
        }
    }

    pub fn sload(&self, contract: &Contract, key: &Word) -> Word {
        self.state.storage(&contract.address, key)
    }

    pub fn sstore(&mut self, contract: &Contract, key: Word, value: Word) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::WriteProtection);
        }
        self.state.set_storage(&contract.address, key, value);
        Ok(())
    }

    pub fn tload(&self, contract: &Contract, key: &Word) -> Word {
        self.state.transient(&contract.address, key)
    }

    pub fn tstore(&mut self, contract: &Contract, key: Word, value: Word) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::WriteProtection);
        }
        self.state.set_transient(&contract.address, key, value);
        Ok(())
    }

    pub fn can_transfer(&self, from: &Address, value: Word) -> bool {
        self.state.balance(from) >= value
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: Word) {
        if value.is_zero() {
            return;
        }
        self.state.sub_balance(from, value);
        self.state.add_balance(to, value);
    }

    fn new_vm_version(&self) -> VmVersion {
        if self.rules.is_active(Fork::Istanbul) {
            VmVersion::V1
        } else {
            VmVersion::V0
        }
    }

    /// Depth and cancellation checks shared by every entry point.
    fn guard(&self) -> Result<(), VmError> {
        if self.cancel.is_cancelled() {
            return Err(VmError::TotalTimeLimitReached);
        }
        if self.depth > CALL_DEPTH_LIMIT {
            return Err(VmError::Depth);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn trace_enter(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Option<Word>,
    ) {
        let depth = self.depth;
        if let Some(tracer) = self.tracer.as_deref_mut() {
            if depth == 0 {
                tracer.capture_start(kind, from, to, input, gas, value.unwrap_or_default());
            } else {
                tracer.capture_enter(kind, from, to, input, gas, value);
            }
        }
    }

    fn trace_exit(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {
        let depth = self.depth;
        if let Some(tracer) = self.tracer.as_deref_mut() {
            if depth == 0 {
                tracer.capture_end(output, gas_used, err);
            } else {
                tracer.capture_exit(output, gas_used, err);
            }
        }
    }

    pub(crate) fn trace_tx_start(&mut self, gas_limit: u64) {
        if let Some(tracer) = self.tracer.as_deref_mut() {
            tracer.capture_tx_start(gas_limit);
        }
    }

    pub(crate) fn trace_tx_end(&mut self, rest_gas: u64) {
        if let Some(tracer) = self.tracer.as_deref_mut() {
            tracer.capture_tx_end(rest_gas);
        }
    }

    /// A frame that runs nothing but is still visible to the tracer.
    #[allow(clippy::too_many_arguments)]
    fn trace_noop(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Option<Word>,
        err: Option<&VmError>,
    ) {
        self.trace_enter(kind, from, to, input, gas, value);
        self.trace_exit(&[], 0, err);
    }

    /// Looks up `to` in the caller's table. Reserved addresses without an
    /// active routine, or receiving value, are rejected.
    fn precompile_for(
        &self,
        caller: &Address,
        to: &Address,
        value: Word,
    ) -> Result<Option<Precompile>, VmError> {
        if !to.is_reserved_precompile() {
            return Ok(None);
        }
        match self.precompiles(caller).get(to) {
            Some(precompile) if value.is_zero() => Ok(Some(*precompile)),
            _ => Err(VmError::PrecompiledContractAddress),
        }
    }

    fn run_precompile(
        &mut self,
        precompile: &Precompile,
        contract: &mut Contract,
        input: &[u8],
    ) -> Result<Vec<u8>, Halt> {
        let cost = precompile.cost(input);
        if !contract.use_gas(cost.gas) {
            return Err(VmError::OutOfGas.into());
        }
        self.charge_computation(cost.computation)?;
        precompile
            .run(input, contract, self)
            .map_err(|err| VmError::from(err).into())
    }

    fn execute(
        &mut self,
        precompile: Option<Precompile>,
        contract: &mut Contract,
        input: &[u8],
    ) -> Result<Vec<u8>, Halt> {
        if let Some(precompile) = precompile {
            return self.run_precompile(&precompile, contract, input);
        }
        if contract.code.is_empty() {
            return Ok(Vec::new());
        }
        let interpreter = Arc::clone(&self.interpreter);
        self.depth += 1;
        let result = interpreter.run(self, contract, input);
        self.depth -= 1;
        result
    }

    /// Reverts on any fault; every fault but a revert also burns the frame's gas.
    fn settle(
        &mut self,
        snapshot: usize,
        contract: &mut Contract,
        result: Result<Vec<u8>, Halt>,
    ) -> (Vec<u8>, Option<VmError>) {
        match result {
            Ok(output) => (output, None),
            Err(Halt { err, output }) => {
                self.state.revert_to_snapshot(snapshot);
                if err == VmError::ExecutionReverted {
                    (output, Some(err))
                } else {
                    contract.gas = 0;
                    (Vec::new(), Some(err))
                }
            }
        }
    }

    fn finish_frame(
        &mut self,
        snapshot: usize,
        mut contract: Contract,
        gas: u64,
        result: Result<Vec<u8>, Halt>,
    ) -> CallResult {
        let (output, err) = self.settle(snapshot, &mut contract, result);
        self.trace_exit(&output, gas - contract.gas, err.as_ref());
        CallResult {
            output,
            gas_left: contract.gas,
            err,
        }
    }

    /// Message call to `to`, transferring `value`.
    pub fn call(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Word,
    ) -> CallResult {
        const KIND: CallKind = CallKind::Call;
        if self.config.no_recursion && self.depth > 0 {
            return CallResult::ok(Vec::new(), gas);
        }
        if let Err(err) = self.guard() {
            return CallResult::fail(err, gas);
        }
        if !value.is_zero() && !self.can_transfer(&caller, value) {
            return CallResult::fail(VmError::InsufficientBalance, gas);
        }

        let snapshot = self.state.snapshot();
        let precompile = match self.precompile_for(&caller, &to, value) {
            Ok(precompile) => precompile,
            Err(err) => {
                self.trace_noop(KIND, caller, to, input, gas, Some(value), Some(&err));
                return CallResult::fail(err, gas);
            }
        };
        if precompile.is_some() && !self.state.exist(&to) {
            let version = self.new_vm_version();
            self.state.create_contract(&to, version);
        }

        if !self.state.exist(&to) {
            if value.is_zero() {
                self.trace_noop(KIND, caller, to, input, gas, Some(value), None);
                return CallResult::ok(Vec::new(), gas);
            }
            self.state.create_eoa(&to, AccountKey::Legacy);
        }
        self.transfer(&caller, &to, value);

        if precompile.is_none() && !self.state.is_program_account(&to) {
            tracing::debug!(%to, "call to a non-program account");
            self.trace_noop(KIND, caller, to, input, gas, Some(value), None);
            return CallResult::ok(Vec::new(), gas);
        }

        let code = self.resolve_code(&to);
        let mut contract = Contract::new(caller, to, value, gas).with_code(to, code);
        self.trace_enter(KIND, caller, to, input, gas, Some(value));
        let result = self.execute(precompile, &mut contract, input);
        self.finish_frame(snapshot, contract, gas, result)
    }

    /// Runs the code of `to` against the caller's own account.
    pub fn call_code(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Word,
    ) -> CallResult {
        const KIND: CallKind = CallKind::CallCode;
        if self.config.no_recursion && self.depth > 0 {
            return CallResult::ok(Vec::new(), gas);
        }
        if let Err(err) = self.guard() {
            return CallResult::fail(err, gas);
        }
        if !value.is_zero() && !self.can_transfer(&caller, value) {
            return CallResult::fail(VmError::InsufficientBalance, gas);
        }
        let precompile = match self.precompile_for(&caller, &to, value) {
            Ok(precompile) => precompile,
            Err(err) => {
                self.trace_noop(KIND, caller, to, input, gas, Some(value), Some(&err));
                return CallResult::fail(err, gas);
            }
        };

        let snapshot = self.state.snapshot();
        let code = self.resolve_code(&to);
        let mut contract = Contract::new(caller, caller, value, gas).with_code(to, code);
        self.trace_enter(KIND, caller, to, input, gas, Some(value));
        let result = self.execute(precompile, &mut contract, input);
        self.finish_frame(snapshot, contract, gas, result)
    }

    /// Runs the code of `to` in the frame of `parent`, keeping its caller and value.
    pub fn delegate_call(
        &mut self,
        parent: &Contract,
        to: Address,
        input: &[u8],
        gas: u64,
    ) -> CallResult {
        const KIND: CallKind = CallKind::DelegateCall;
        if self.config.no_recursion && self.depth > 0 {
            return CallResult::ok(Vec::new(), gas);
        }
        if let Err(err) = self.guard() {
            return CallResult::fail(err, gas);
        }
        let from = parent.address;
        let precompile = match self.precompile_for(&from, &to, Word::zero()) {
            Ok(precompile) => precompile,
            Err(err) => {
                self.trace_noop(KIND, from, to, input, gas, Some(parent.value), Some(&err));
                return CallResult::fail(err, gas);
            }
        };

        let snapshot = self.state.snapshot();
        let code = self.resolve_code(&to);
        let mut contract = Contract::as_delegate(parent, gas).with_code(to, code);
        self.trace_enter(KIND, from, to, input, gas, Some(parent.value));
        let result = self.execute(precompile, &mut contract, input);
        self.finish_frame(snapshot, contract, gas, result)
    }

    /// Call during which every state modification fails with a write
    /// protection fault, including in nested frames.
    pub fn static_call(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: u64,
    ) -> CallResult {
        const KIND: CallKind = CallKind::StaticCall;
        if self.config.no_recursion && self.depth > 0 {
            return CallResult::ok(Vec::new(), gas);
        }
        if let Err(err) = self.guard() {
            return CallResult::fail(err, gas);
        }
        let precompile = match self.precompile_for(&caller, &to, Word::zero()) {
            Ok(precompile) => precompile,
            Err(err) => {
                self.trace_noop(KIND, caller, to, input, gas, None, Some(&err));
                return CallResult::fail(err, gas);
            }
        };

        let was_read_only = self.read_only;
        self.read_only = true;

        let snapshot = self.state.snapshot();
        let code = self.resolve_code(&to);
        let mut contract = Contract::new(caller, to, Word::zero(), gas).with_code(to, code);
        self.trace_enter(KIND, caller, to, input, gas, None);
        let result = self.execute(precompile, &mut contract, input);
        let result = self.finish_frame(snapshot, contract, gas, result);

        self.read_only = was_read_only;
        result
    }

    /// Deploys `code` at the address derived from the caller's nonce.
    pub fn create(&mut self, caller: Address, code: &[u8], gas: u64, value: Word) -> CreateResult {
        let address = caller.create(self.state.nonce(&caller));
        self.create_at(CallKind::Create, caller, code, gas, value, address)
    }

    /// Deploys `code` at the address derived from `salt` and the code hash.
    pub fn create2(
        &mut self,
        caller: Address,
        code: &[u8],
        gas: u64,
        value: Word,
        salt: Word,
    ) -> CreateResult {
        let address = caller.create2(&salt, code);
        self.create_at(CallKind::Create2, caller, code, gas, value, address)
    }

    /// An address is taken once it carries a nonce, code or storage. Before
    /// `Prague` any existing account counts.
    fn collides(&self, address: &Address) -> bool {
        if !self.rules.is_prague() {
            return self.state.exist(address);
        }
        let code_hash = self.state.code_hash(address);
        let root = self.state.storage_root(address);
        self.state.nonce(address) != 0
            || (code_hash != [0u8; 32] && code_hash != EMPTY_CODE_HASH)
            || (root != [0u8; 32] && root != EMPTY_ROOT_HASH)
    }

    fn create_at(
        &mut self,
        kind: CallKind,
        caller: Address,
        code: &[u8],
        gas: u64,
        value: Word,
        address: Address,
    ) -> CreateResult {
        if let Err(err) = self.guard() {
            return CreateResult::fail(err, gas);
        }
        if !value.is_zero() && !self.can_transfer(&caller, value) {
            return CreateResult::fail(VmError::InsufficientBalance, gas);
        }
        let nonce = self.state.nonce(&caller);
        let Some(next) = nonce.checked_add(1) else {
            return CreateResult::fail(VmError::NonceUintOverflow, gas);
        };
        self.state.set_nonce(&caller, next);

        if self.rules.is_active(Fork::Kore) {
            self.state.add_address_to_access_list(&address);
        }
        if self.collides(&address) {
            return CreateResult::fail(VmError::ContractAddressCollision, 0);
        }
        if address.is_reserved_precompile() {
            return CreateResult::fail(VmError::PrecompiledContractAddress, 0);
        }

        let snapshot = self.state.snapshot();
        let version = self.new_vm_version();
        self.state.create_contract(&address, version);
        self.state.set_nonce(&address, 1);
        // Code-store faults keep the materialized account.
        let materialized = self.state.snapshot();
        self.transfer(&caller, &address, value);

        if self.config.no_recursion && self.depth > 0 {
            return CreateResult {
                address,
                gas_left: gas,
                ..Default::default()
            };
        }

        let mut contract =
            Contract::new(caller, address, value, gas).with_code(address, code.to_vec());
        self.trace_enter(kind, caller, address, code, gas, Some(value));
        let (rollback, result) = match self.execute(None, &mut contract, &[]) {
            Ok(output) => (materialized, self.store_code(&mut contract, &address, output)),
            Err(halt) => (snapshot, Err(halt)),
        };
        let (output, err) = self.settle(rollback, &mut contract, result);
        self.trace_exit(&output, gas - contract.gas, err.as_ref());

        CreateResult {
            output,
            address,
            gas_left: contract.gas,
            err,
        }
    }

    fn store_code(
        &mut self,
        contract: &mut Contract,
        address: &Address,
        code: Vec<u8>,
    ) -> Result<Vec<u8>, Halt> {
        if code.len() > MAX_CODE_SIZE {
            return Err(VmError::MaxCodeSizeExceeded.into());
        }
        if code.first() == Some(&0xef) && self.rules.is_active(Fork::London) {
            return Err(VmError::InvalidCode.into());
        }
        let cost = (code.len() as u64).saturating_mul(CREATE_DATA_GAS);
        if !contract.use_gas(cost) {
            return Err(VmError::CodeStoreOutOfGas.into());
        }
        if let Err(err) = self.state.set_code(address, code.clone()) {
            tracing::debug!(%address, %err, "failed to store contract code");
            return Err(VmError::FailedOnSetCode.into());
        }
        Ok(code)
    }
}
