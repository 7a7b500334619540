//! Consensus variants.
//!
//! Maps a block's number and timestamp to the revm rule set that was active when the block was
//! produced.
use clap::ValueEnum;
use lazy_static::lazy_static;
use revm::primitives::SpecId;
use strum_macros::Display;

use crate::errors::ReplayError;

/// Networks whose fork schedule is known.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Chain {
    #[default]
    Mainnet,
    /// Local development chain with every supported fork active from genesis.
    Dev,
}

impl Chain {
    pub fn spec(&self) -> &'static ChainSpec {
        match self {
            Chain::Mainnet => &MAINNET,
            Chain::Dev => &DEV,
        }
    }
}

/// When a fork becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkCondition {
    Block(u64),
    Timestamp(u64),
}

impl ForkCondition {
    pub fn is_active_at(&self, number: u64, timestamp: u64) -> bool {
        match self {
            ForkCondition::Block(activation) => number >= *activation,
            ForkCondition::Timestamp(activation) => timestamp >= *activation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    pub chain_id: u64,
    /// Forks in activation order.
    pub forks: Vec<(SpecId, ForkCondition)>,
    /// First fork of this chain whose final rules the bundled revm does not implement. Blocks
    /// from its activation on are refused instead of being replayed under older rules.
    pub unsupported: Option<(&'static str, ForkCondition)>,
}

impl ChainSpec {
    /// Returns the newest rule set active for a block with the given number and timestamp.
    ///
    /// Falls back to `FRONTIER` if no fork matches.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Engine` if the block falls under the `unsupported` fork.
    pub fn spec_id_at(&self, number: u64, timestamp: u64) -> Result<SpecId, ReplayError> {
        if let Some((name, condition)) = &self.unsupported {
            if condition.is_active_at(number, timestamp) {
                return Err(ReplayError::Engine(format!(
                    "block {number} (timestamp {timestamp}) runs under {name} rules, which are not \
                     supported"
                )));
            }
        }
        Ok(self
            .forks
            .iter()
            .rev()
            .find(|(_, condition)| condition.is_active_at(number, timestamp))
            .map(|(spec_id, _)| *spec_id)
            .unwrap_or(SpecId::FRONTIER))
    }
}

lazy_static! {
    pub static ref MAINNET: ChainSpec = ChainSpec {
        chain_id: 1,
        forks: vec![
            (SpecId::FRONTIER, ForkCondition::Block(0)),
            (SpecId::HOMESTEAD, ForkCondition::Block(1_150_000)),
            (SpecId::DAO_FORK, ForkCondition::Block(1_920_000)),
            (SpecId::TANGERINE, ForkCondition::Block(2_463_000)),
            (SpecId::SPURIOUS_DRAGON, ForkCondition::Block(2_675_000)),
            (SpecId::BYZANTIUM, ForkCondition::Block(4_370_000)),
            // Constantinople and Petersburg activated on the same block.
            (SpecId::PETERSBURG, ForkCondition::Block(7_280_000)),
            (SpecId::ISTANBUL, ForkCondition::Block(9_069_000)),
            (SpecId::MUIR_GLACIER, ForkCondition::Block(9_200_000)),
            (SpecId::BERLIN, ForkCondition::Block(12_244_000)),
            (SpecId::LONDON, ForkCondition::Block(12_965_000)),
            (SpecId::ARROW_GLACIER, ForkCondition::Block(13_773_000)),
            (SpecId::GRAY_GLACIER, ForkCondition::Block(15_050_000)),
            (SpecId::MERGE, ForkCondition::Block(15_537_394)),
            (SpecId::SHANGHAI, ForkCondition::Timestamp(1_681_338_455)),
            (SpecId::CANCUN, ForkCondition::Timestamp(1_710_338_135)),
        ],
        unsupported: Some(("prague", ForkCondition::Timestamp(1_746_612_311))),
    };
    pub static ref DEV: ChainSpec = ChainSpec {
        chain_id: 1337,
        forks: vec![
            (SpecId::MERGE, ForkCondition::Block(0)),
            (SpecId::SHANGHAI, ForkCondition::Timestamp(0)),
            (SpecId::CANCUN, ForkCondition::Timestamp(0)),
        ],
        unsupported: None,
    };
}
