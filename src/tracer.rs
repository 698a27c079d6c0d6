use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

use crate::{
    common::{Address, Hex, Word},
    error::VmError,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallKind {
    #[default]
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
}

impl CallKind {
    pub fn is_create(&self) -> bool {
        matches!(self, CallKind::Create | CallKind::Create2)
    }
}

/// Observer of call-frame transitions. Every hook defaults to a no-op.
#[allow(unused_variables)]
pub trait Tracer {
    fn capture_tx_start(&mut self, gas_limit: u64) {}
    fn capture_tx_end(&mut self, rest_gas: u64) {}

    /// Top-level frame.
    fn capture_start(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Word,
    ) {
    }
    fn capture_end(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {}

    /// Nested frame. `value` is absent for static calls.
    #[allow(clippy::too_many_arguments)]
    fn capture_enter(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Option<Word>,
    ) {
    }
    fn capture_exit(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {}
}

#[derive(Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

fn hex_u64<S>(x: &u64, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&format!("0x{x:x}"))
}

/// One call in the trace tree, in the callTracer JSON shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub kind: CallKind,
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Word>,
    #[serde(serialize_with = "hex_u64")]
    pub gas: u64,
    #[serde(serialize_with = "hex_u64")]
    pub gas_used: u64,
    pub input: Hex,
    #[serde(skip_serializing_if = "Hex::is_empty")]
    pub output: Hex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallFrame>,
}

impl CallFrame {
    fn new(
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Option<Word>,
    ) -> Self {
        Self {
            kind,
            from,
            to: Some(to),
            value,
            gas,
            input: input.into(),
            ..Default::default()
        }
    }

    fn process_output(&mut self, output: &[u8], err: Option<&VmError>) {
        let Some(err) = err else {
            self.output = output.into();
            return;
        };
        self.error = Some(err.to_string());
        if self.kind.is_create() {
            self.to = None;
        }
        if err != &VmError::ExecutionReverted || output.is_empty() {
            return;
        }
        self.output = output.into();
        self.revert_reason = decode_revert_reason(output);
    }
}

const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Decodes an ABI-encoded `Error(string)` payload.
pub fn decode_revert_reason(output: &[u8]) -> Option<String> {
    let (selector, body) = output.split_first_chunk::<4>()?;
    if selector != &ERROR_SELECTOR {
        return None;
    }
    let word = |at: usize| -> Option<usize> {
        let bytes = body.get(at..at.checked_add(32)?)?;
        Word::from_bytes(bytes).to_u64().map(|n| n as usize)
    };
    let offset = word(0)?;
    let len = word(offset)?;
    let start = offset.checked_add(32)?;
    let data = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(data.to_vec()).ok()
}

/// Cloneable stop switch for a running [`CallTracer`].
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    reason: Arc<OnceCell<String>>,
}

impl Interrupt {
    /// First caller wins; later reasons are ignored.
    /// The reason is stored before the flag is raised.
    pub fn stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.reason.set(reason.clone()).is_ok() {
            tracing::warn!(%reason, "call tracer interrupted");
            self.flag.store(true, Ordering::Release);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn reason(&self) -> String {
        self.reason
            .get()
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TracerError {
    #[error("incorrect number of top-level calls: {0}")]
    IncorrectTopLevelCalls(usize),
    #[error("tracing interrupted: {reason}")]
    Interrupted {
        reason: String,
        partial: Box<CallFrame>,
    },
}

/// Builds the call tree of one message.
pub struct CallTracer {
    callstack: Vec<CallFrame>,
    gas_limit: u64,
    only_top_call: bool,
    interrupt: Interrupt,
    /// Open frames whose enter was suppressed after an interrupt.
    skipped: usize,
}

impl Default for CallTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTracer {
    pub fn new() -> Self {
        Self {
            callstack: vec![CallFrame::default()],
            gas_limit: 0,
            only_top_call: false,
            interrupt: Interrupt::default(),
            skipped: 0,
        }
    }

    pub fn only_top_call(mut self) -> Self {
        self.only_top_call = true;
        self
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn stop(&self, reason: impl Into<String>) {
        self.interrupt.stop(reason);
    }

    pub fn result(&self) -> Result<CallFrame, TracerError> {
        let [root] = self.callstack.as_slice() else {
            return Err(TracerError::IncorrectTopLevelCalls(self.callstack.len()));
        };
        if self.interrupt.is_stopped() {
            return Err(TracerError::Interrupted {
                reason: self.interrupt.reason(),
                partial: Box::new(root.clone()),
            });
        }
        Ok(root.clone())
    }
}

impl Tracer for CallTracer {
    fn capture_tx_start(&mut self, gas_limit: u64) {
        self.gas_limit = gas_limit;
    }

    fn capture_tx_end(&mut self, rest_gas: u64) {
        if let Some(root) = self.callstack.first_mut() {
            root.gas_used = self.gas_limit.saturating_sub(rest_gas);
        }
    }

    fn capture_start(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Word,
    ) {
        if let Some(root) = self.callstack.first_mut() {
            *root = CallFrame::new(kind, from, to, input, gas, Some(value));
        }
    }

    fn capture_end(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {
        if let Some(root) = self.callstack.first_mut() {
            root.gas_used = gas_used;
            root.process_output(output, err);
        }
    }

    fn capture_enter(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Option<Word>,
    ) {
        if self.only_top_call {
            return;
        }
        if self.skipped > 0 || self.interrupt.is_stopped() {
            self.skipped += 1;
            return;
        }
        self.callstack
            .push(CallFrame::new(kind, from, to, input, gas, value));
    }

    fn capture_exit(&mut self, output: &[u8], gas_used: u64, err: Option<&VmError>) {
        if self.only_top_call {
            return;
        }
        if self.skipped > 0 {
            self.skipped -= 1;
            return;
        }
        if self.callstack.len() <= 1 {
            return;
        }
        let Some(mut frame) = self.callstack.pop() else {
            return;
        };
        frame.gas_used = gas_used;
        frame.process_output(output, err);
        if let Some(parent) = self.callstack.last_mut() {
            parent.calls.push(frame);
        }
    }
}
