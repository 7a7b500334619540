use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use alloy_primitives::B256;
use tracing::debug;

use crate::{
    errors::StoreError,
    evm::{
        engine_db::engine_db_interface::{HeaderReader, StateProvider},
        trie,
    },
    models::{BlockHeader, StateSnapshot},
};

#[derive(Clone, Debug, Default)]
pub struct MemoryDBInner {
    head: B256,
    headers: BTreeMap<u64, BlockHeader>,
    states: HashMap<B256, StateSnapshot>,
}

/// In-memory chain database.
///
/// Clones share the same underlying data.
#[derive(Clone, Debug, Default)]
pub struct MemoryDB {
    /// Shared chain data
    ///
    /// `inner` encapsulates `MemoryDBInner` using `RwLock` for concurrent reads and exclusive
    /// writes, and `Arc` for shared ownership of the lock across threads.
    pub inner: Arc<RwLock<MemoryDBInner>>,
}

impl MemoryDB {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a canonical header. The highest-numbered header inserted so far becomes the head.
    pub fn insert_header(&self, header: BlockHeader) {
        let mut write_guard = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let is_new_head = write_guard
            .headers
            .keys()
            .next_back()
            .map_or(true, |highest| header.number >= *highest);
        if is_new_head {
            write_guard.head = header.hash;
        }
        debug!(number = header.number, hash = %header.hash, "Inserted header");
        write_guard
            .headers
            .insert(header.number, header);
    }

    /// Stores a snapshot under the root it commits to and returns that root.
    pub fn insert_state(&self, snapshot: StateSnapshot) -> B256 {
        let root = trie::state_root(&snapshot);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .insert(root, snapshot);
        root
    }

    pub fn set_head(&self, hash: B256) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .head = hash;
    }
}

impl HeaderReader for MemoryDB {
    fn head_hash(&self) -> Result<B256, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .head)
    }

    fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .headers
            .get(&number)
            .cloned())
    }
}

impl StateProvider for MemoryDB {
    fn state_at(&self, root: B256) -> Result<StateSnapshot, StoreError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .get(&root)
            .cloned()
            .ok_or(StoreError::MissingState(root))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes, U256};

    use super::*;

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            number,
            hash: B256::with_last_byte(number as u8),
            parent_hash: B256::ZERO,
            state_root: B256::ZERO,
            timestamp: number,
            beneficiary: Address::ZERO,
            gas_limit: 30_000_000,
            base_fee_per_gas: None,
            difficulty: U256::ZERO,
            mix_hash: B256::ZERO,
            excess_blob_gas: None,
        }
    }

    #[test]
    fn test_empty_db_has_zero_head() {
        let db = MemoryDB::new();

        assert_eq!(db.head_hash().unwrap(), B256::ZERO);
        assert_eq!(db.header_by_number(1).unwrap(), None);
    }

    #[test]
    fn test_highest_header_is_head() {
        let db = MemoryDB::new();
        db.insert_header(header(2));
        db.insert_header(header(1));

        assert_eq!(db.head_hash().unwrap(), B256::with_last_byte(2));
        assert_eq!(db.block_hash(1).unwrap(), Some(B256::with_last_byte(1)));
    }

    #[test]
    fn test_clones_share_state() {
        let db = MemoryDB::new();
        let mut snapshot = StateSnapshot::default();
        let address = Address::repeat_byte(1);
        snapshot.insert_account(address, U256::from(1), 0, Bytes::new(), Vec::new());

        let root = db.clone().insert_state(snapshot.clone());

        assert_eq!(db.state_at(root).unwrap(), snapshot);
        assert!(matches!(db.state_at(B256::ZERO), Err(StoreError::MissingState(_))));
    }
}
