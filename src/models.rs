//! Basic data structures
//!
//! This module contains the records read from the chain database: block headers and the
//! account/storage snapshot a state root resolves to. They double as the on-disk format of
//! [`ArchiveDB`](crate::evm::engine_db::archive_db::ArchiveDB).
use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use revm::primitives::KECCAK_EMPTY;
use serde::{Deserialize, Serialize};

/// Immutable record of a historical block.
///
/// Only the fields needed to locate the post-block state and to rebuild the block environment
/// are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    #[serde(default)]
    pub parent_hash: B256,
    /// Root of the state produced by executing this block.
    pub state_root: B256,
    pub timestamp: u64,
    /// Coinbase of the block.
    pub beneficiary: Address,
    pub gas_limit: u64,
    /// Present from London onwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<u64>,
    /// Proof-of-work difficulty. Zero after the merge.
    #[serde(default)]
    pub difficulty: U256,
    /// Carries the beacon chain randomness after the merge.
    #[serde(default)]
    pub mix_hash: B256,
    /// Present from Cancun onwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excess_blob_gas: Option<u64>,
}

/// Account as committed to the state trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRecord {
    pub balance: U256,
    pub nonce: u64,
    /// `KECCAK_EMPTY` for accounts without code.
    pub code_hash: B256,
    pub storage_root: B256,
}

/// A single account inside a [`StateSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAccount {
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default = "empty_code_hash")]
    pub code_hash: B256,
    /// Non-zero storage slots. A zero value is equivalent to an absent slot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<U256, U256>,
}

impl Default for SnapshotAccount {
    fn default() -> Self {
        Self { balance: U256::ZERO, nonce: 0, code_hash: KECCAK_EMPTY, storage: BTreeMap::new() }
    }
}

fn empty_code_hash() -> B256 {
    KECCAK_EMPTY
}

/// Complete account and contract-storage state behind one state root.
///
/// Bytecode is stored once per code hash in `codes`, accounts reference it by `code_hash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub accounts: BTreeMap<Address, SnapshotAccount>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub codes: BTreeMap<B256, Bytes>,
}

impl StateSnapshot {
    /// Adds an account, registering its bytecode under its keccak hash.
    ///
    /// Empty `code` leaves the account without code.
    pub fn insert_account(
        &mut self,
        address: Address,
        balance: U256,
        nonce: u64,
        code: Bytes,
        storage: impl IntoIterator<Item = (U256, U256)>,
    ) {
        let code_hash = if code.is_empty() {
            KECCAK_EMPTY
        } else {
            let hash = alloy_primitives::keccak256(&code);
            self.codes.insert(hash, code);
            hash
        };
        let storage = storage
            .into_iter()
            .filter(|(_, value)| !value.is_zero())
            .collect();
        self.accounts
            .insert(address, SnapshotAccount { balance, nonce, code_hash, storage });
    }
}
