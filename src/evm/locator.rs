use alloy_primitives::B256;
use tracing::{debug, instrument};

use crate::{
    errors::{ReplayError, StoreError, UsageError},
    evm::engine_db::engine_db_interface::HeaderReader,
    models::BlockHeader,
};

/// Finds the canonical header of a historical block and the state root it produced.
#[derive(Debug)]
pub struct HistoricalLocator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: HeaderReader + ?Sized> HistoricalLocator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Looks up block `number`.
    ///
    /// # Returns
    ///
    /// The header together with the state root the block's execution produced.
    ///
    /// # Errors
    ///
    /// * `UsageError::GenesisBlock` - `number` is 0. Checked before the store is read.
    /// * `StoreError::EmptyHead` - the store's head hash is zero, i.e. it was never populated.
    /// * `StoreError::BlockNotFound` - the store has no header at `number`.
    #[instrument(skip(self))]
    pub fn locate(&self, number: u64) -> Result<(BlockHeader, B256), ReplayError> {
        if number == 0 {
            return Err(UsageError::GenesisBlock.into());
        }
        if self.store.head_hash()?.is_zero() {
            return Err(StoreError::EmptyHead.into());
        }
        let header = self
            .store
            .header_by_number(number)?
            .ok_or(StoreError::BlockNotFound(number))?;
        debug!(hash = %header.hash, state_root = %header.state_root, "Located block");
        let state_root = header.state_root;
        Ok((header, state_root))
    }
}
