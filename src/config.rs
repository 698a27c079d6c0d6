use serde::{Deserialize, Serialize};

use crate::common::Word;

/// Hard-fork milestones in activation order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fork {
    #[default]
    Genesis,
    Istanbul,
    London,
    EthTxType,
    Magma,
    Kore,
    Shanghai,
    Cancun,
    Kaia,
    Prague,
    Osaka,
}

impl Fork {
    pub const ALL: [Fork; 11] = [
        Fork::Genesis,
        Fork::Istanbul,
        Fork::London,
        Fork::EthTxType,
        Fork::Magma,
        Fork::Kore,
        Fork::Shanghai,
        Fork::Cancun,
        Fork::Kaia,
        Fork::Prague,
        Fork::Osaka,
    ];
}

/// Rules in force for one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rules {
    pub fork: Fork,
    pub chain_id: Word,
}

impl Rules {
    pub fn new(chain_id: Word, fork: Fork) -> Self {
        Self { fork, chain_id }
    }

    pub fn is_active(&self, fork: Fork) -> bool {
        self.fork >= fork
    }

    /// Fee-cap rules (dynamic base fee).
    pub fn is_magma(&self) -> bool {
        self.is_active(Fork::Magma)
    }

    pub fn is_prague(&self) -> bool {
        self.is_active(Fork::Prague)
    }
}

pub const DEFAULT_COMPUTATION_COST_LIMIT: u64 = 100_000_000;
pub const CANCUN_COMPUTATION_COST_LIMIT: u64 = 150_000_000;

/// Chain parameters. Absent fork blocks mean the fork never activates.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: Word,
    #[serde(default)]
    pub istanbul_block: Option<u64>,
    #[serde(default)]
    pub london_block: Option<u64>,
    #[serde(default)]
    pub eth_tx_type_block: Option<u64>,
    #[serde(default)]
    pub magma_block: Option<u64>,
    #[serde(default)]
    pub kore_block: Option<u64>,
    #[serde(default)]
    pub shanghai_block: Option<u64>,
    #[serde(default)]
    pub cancun_block: Option<u64>,
    #[serde(default)]
    pub kaia_block: Option<u64>,
    #[serde(default)]
    pub prague_block: Option<u64>,
    #[serde(default)]
    pub osaka_block: Option<u64>,
    /// Fees are distributed by the block reward logic instead of being credited per message.
    #[serde(default)]
    pub deferred_tx_fee: bool,
}

impl ChainConfig {
    /// Config with every fork up to and including `fork` active from block zero.
    pub fn with_fork(chain_id: u64, fork: Fork) -> Self {
        let at = |f: Fork| (fork >= f).then_some(0);
        Self {
            chain_id: Word::from(chain_id),
            istanbul_block: at(Fork::Istanbul),
            london_block: at(Fork::London),
            eth_tx_type_block: at(Fork::EthTxType),
            magma_block: at(Fork::Magma),
            kore_block: at(Fork::Kore),
            shanghai_block: at(Fork::Shanghai),
            cancun_block: at(Fork::Cancun),
            kaia_block: at(Fork::Kaia),
            prague_block: at(Fork::Prague),
            osaka_block: at(Fork::Osaka),
            deferred_tx_fee: false,
        }
    }

    fn activation(&self, fork: Fork) -> Option<u64> {
        match fork {
            Fork::Genesis => Some(0),
            Fork::Istanbul => self.istanbul_block,
            Fork::London => self.london_block,
            Fork::EthTxType => self.eth_tx_type_block,
            Fork::Magma => self.magma_block,
            Fork::Kore => self.kore_block,
            Fork::Shanghai => self.shanghai_block,
            Fork::Cancun => self.cancun_block,
            Fork::Kaia => self.kaia_block,
            Fork::Prague => self.prague_block,
            Fork::Osaka => self.osaka_block,
        }
    }

    /// Highest fork active at `block`. Forks activate in order, so the scan
    /// stops at the first one not yet reached.
    pub fn rules(&self, block: u64) -> Rules {
        let fork = Fork::ALL
            .iter()
            .take_while(|fork| self.activation(**fork).is_some_and(|at| at <= block))
            .last()
            .copied()
            .unwrap_or_default();
        Rules::new(self.chain_id, fork)
    }

    pub fn computation_cost_limit(&self, rules: &Rules) -> u64 {
        if rules.is_active(Fork::Cancun) {
            CANCUN_COMPUTATION_COST_LIMIT
        } else {
            DEFAULT_COMPUTATION_COST_LIMIT
        }
    }
}

/// Per-engine switches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VmConfig {
    /// Speculative execution: message validation is skipped.
    pub prefetching: bool,
    /// Simulation calls: zero fee caps bypass the base fee check.
    pub no_base_fee: bool,
    /// Overrides the chain's computation cost limit when set.
    pub computation_cost_limit: Option<u64>,
    /// Nested calls and creations return success without running any code.
    pub no_recursion: bool,
}
