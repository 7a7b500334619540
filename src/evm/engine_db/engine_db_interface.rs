use alloy_primitives::{Address, B256, U256};

use crate::{
    errors::StoreError,
    models::{AccountRecord, BlockHeader, StateSnapshot},
};

/// Read access to canonical block headers.
pub trait HeaderReader {
    /// Hash of the canonical head block. A never-populated database reports the zero hash.
    fn head_hash(&self) -> Result<B256, StoreError>;

    /// Canonical header at `number`, `None` if the database has no such block.
    fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, StoreError>;

    fn block_hash(&self, number: u64) -> Result<Option<B256>, StoreError> {
        Ok(self
            .header_by_number(number)?
            .map(|header| header.hash))
    }
}

/// Resolves a state root to the complete state it commits to.
pub trait StateProvider {
    /// # Errors
    ///
    /// Returns a `StoreError` if the root is unknown or its state cannot be materialised in full.
    fn state_at(&self, root: B256) -> Result<StateSnapshot, StoreError>;
}

/// A read-only chain database: canonical headers plus the states their roots resolve to.
pub trait ChainStore: HeaderReader + StateProvider + Send + Sync {}

impl<T: HeaderReader + StateProvider + Send + Sync> ChainStore for T {}

/// Immutable world state identified by a state root.
pub trait StateView {
    fn state_root(&self) -> B256;

    /// Account at `address`, `None` if it does not exist in this state.
    fn account(&self, address: &Address) -> Option<AccountRecord>;

    /// Storage value of `key` in the account at `address`. Absent slots read as zero.
    fn storage(&self, address: &Address, key: U256) -> U256;
}
