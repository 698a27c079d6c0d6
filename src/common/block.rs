use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{address::Address, word::Word};

/// Block-level environment visible to every message in the block.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct BlockContext {
    pub coinbase: Address,
    /// Receives transaction fees once `Magma` is active.
    pub rewardbase: Address,
    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,
    pub number: u64,
    #[serde(rename = "timestamp")]
    pub time: u64,
    #[serde(rename = "baseFeePerGas", default)]
    pub base_fee: Word,
    #[serde(rename = "blockScore", default)]
    pub block_score: Word,
    /// Recent block hashes keyed by block number.
    #[serde(default)]
    pub hashes: BTreeMap<u64, Word>,
}

impl BlockContext {
    /// Hash of one of the 256 most recent ancestors, zero otherwise.
    pub fn block_hash(&self, number: u64) -> Word {
        if number >= self.number || self.number - number > 256 {
            return Word::zero();
        }
        self.hashes.get(&number).copied().unwrap_or_default()
    }
}

/// Message-level environment.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct TxContext {
    pub origin: Address,
    #[serde(rename = "gasPrice")]
    pub gas_price: Word,
    #[serde(rename = "feePayer")]
    pub fee_payer: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTuple {
    pub address: Address,
    #[serde(rename = "storageKeys", default)]
    pub storage_keys: Vec<Word>,
}
