use crate::common::{Address, Word, hash::keccak256};

/// A live call frame: whose code runs, against which account, with how much gas.
#[derive(Clone, Debug, Default)]
pub struct Contract {
    pub caller: Address,
    /// Account whose storage and balance the code operates on.
    pub address: Address,
    /// Account the code was loaded from.
    pub code_address: Address,
    pub code: Vec<u8>,
    pub code_hash: [u8; 32],
    pub value: Word,
    pub gas: u64,
    /// Set for `DELEGATECALL` frames, which inherit caller and value from the parent.
    pub delegate: bool,
}

impl Contract {
    pub fn new(caller: Address, address: Address, value: Word, gas: u64) -> Self {
        Self {
            caller,
            address,
            code_address: address,
            value,
            gas,
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code_address: Address, code: Vec<u8>) -> Self {
        self.code_hash = keccak256(&code);
        self.code_address = code_address;
        self.code = code;
        self
    }

    /// Frame that runs `code` in the context of `parent`.
    pub fn as_delegate(parent: &Contract, gas: u64) -> Self {
        Self {
            caller: parent.caller,
            address: parent.address,
            code_address: parent.address,
            value: parent.value,
            gas,
            delegate: true,
            ..Default::default()
        }
    }

    /// Deducts `gas` if available.
    pub fn use_gas(&mut self, gas: u64) -> bool {
        if self.gas < gas {
            return false;
        }
        self.gas -= gas;
        true
    }

    pub fn refund_gas(&mut self, gas: u64) {
        self.gas = self.gas.saturating_add(gas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_gas() {
        let mut contract = Contract::new(Address::zero(), Address::zero(), Word::zero(), 100);
        assert!(contract.use_gas(60));
        assert!(!contract.use_gas(41));
        assert_eq!(contract.gas, 40);
        contract.refund_gas(10);
        assert_eq!(contract.gas, 50);
    }

    #[test]
    fn test_delegate_inherits_context() {
        let parent = Contract::new(
            Address::precompile(0xaa),
            Address::precompile(0xbb),
            Word::from(5u64),
            1000,
        );
        let child = Contract::as_delegate(&parent, 10)
            .with_code(Address::precompile(0xcc), vec![0x00]);
        assert_eq!(child.caller, parent.caller);
        assert_eq!(child.address, parent.address);
        assert_eq!(child.code_address, Address::precompile(0xcc));
        assert_eq!(child.value, Word::from(5u64));
        assert!(child.delegate);
    }
}
