use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use revm::{
    primitives::{AccountInfo, Bytecode, KECCAK_EMPTY},
    DatabaseRef,
};
use tracing::{debug, instrument, trace};

use crate::{
    errors::StoreError,
    evm::{
        account_storage::{self, AccountStorage},
        engine_db::engine_db_interface::{ChainStore, HeaderReader, StateView},
        trie,
    },
    models::AccountRecord,
};

/// Opens the immutable state identified by `root`.
///
/// The returned view owns the materialised accounts and borrows `store` only to answer
/// `BLOCKHASH` lookups.
///
/// # Errors
///
/// Returns a `StoreError` if the store cannot produce the complete state for `root`.
#[instrument(skip(store))]
pub fn open_state<S: ChainStore + ?Sized>(
    store: &S,
    root: B256,
) -> Result<SnapshotDB<'_, S>, StoreError> {
    let snapshot = store.state_at(root)?;
    let codes = account_storage::decode_codes(&snapshot)?;
    let accounts = AccountStorage::from_snapshot(&snapshot, &codes)?;
    let storage_roots = snapshot
        .accounts
        .iter()
        .map(|(address, account)| (*address, trie::account_storage_root(account)))
        .collect();
    debug!(accounts = accounts.len(), "Opened state view");
    Ok(SnapshotDB { root, accounts, storage_roots, codes, store })
}

/// Read-only view of the world state behind one state root.
///
/// Serves both the [`StateView`] queries and revm's [`DatabaseRef`]. Nothing is ever written
/// back; values observed through the view are fixed for its lifetime.
#[derive(Debug)]
pub struct SnapshotDB<'a, S: ?Sized> {
    root: B256,
    accounts: AccountStorage,
    storage_roots: HashMap<Address, B256>,
    codes: HashMap<B256, Bytecode>,
    store: &'a S,
}

impl<S: ?Sized> StateView for SnapshotDB<'_, S> {
    fn state_root(&self) -> B256 {
        self.root
    }

    fn account(&self, address: &Address) -> Option<AccountRecord> {
        self.accounts
            .get_account_info(address)
            .map(|info| AccountRecord {
                balance: info.balance,
                nonce: info.nonce,
                code_hash: info.code_hash,
                storage_root: self
                    .storage_roots
                    .get(address)
                    .copied()
                    .unwrap_or(alloy_trie::EMPTY_ROOT_HASH),
            })
    }

    fn storage(&self, address: &Address, key: U256) -> U256 {
        self.accounts
            .get_storage(address, &key)
            .unwrap_or_default()
    }
}

impl<S: HeaderReader + ?Sized> DatabaseRef for SnapshotDB<'_, S> {
    type Error = StoreError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        trace!(%address, "Requested account info");
        Ok(self
            .accounts
            .get_account_info(&address)
            .cloned())
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::default());
        }
        self.codes
            .get(&code_hash)
            .cloned()
            .ok_or(StoreError::MissingCode(code_hash))
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let value = self.storage(&address, index);
        trace!(%address, %index, %value, "Requested storage");
        Ok(value)
    }

    /// Canonical hash of block `number`; blocks unknown to the store read as the zero hash.
    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        Ok(self
            .store
            .block_hash(number)?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{keccak256, Bytes};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{evm::engine_db::memory_db::MemoryDB, models::StateSnapshot};

    const CONTRACT: Address = Address::repeat_byte(0xaa);
    const EOA: Address = Address::repeat_byte(0xbb);

    fn code() -> Bytes {
        Bytes::from_static(&[0x60, 0x00, 0x54, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3])
    }

    #[fixture]
    fn store() -> (MemoryDB, B256) {
        let db = MemoryDB::new();
        let mut snapshot = StateSnapshot::default();
        snapshot.insert_account(CONTRACT, U256::ZERO, 1, code(), [(U256::ZERO, U256::from(42))]);
        snapshot.insert_account(EOA, U256::from(1_000), 5, Bytes::new(), Vec::new());
        let root = db.insert_state(snapshot);
        (db, root)
    }

    #[rstest]
    fn test_state_view_reads_accounts(store: (MemoryDB, B256)) {
        let (db, root) = store;

        let view = open_state(&db, root).unwrap();

        assert_eq!(view.state_root(), root);
        let eoa = view.account(&EOA).unwrap();
        assert_eq!(eoa.balance, U256::from(1_000));
        assert_eq!(eoa.nonce, 5);
        assert_eq!(eoa.code_hash, KECCAK_EMPTY);
        assert_eq!(eoa.storage_root, alloy_trie::EMPTY_ROOT_HASH);
        let contract = view.account(&CONTRACT).unwrap();
        assert_eq!(contract.code_hash, keccak256(code()));
        assert_ne!(contract.storage_root, alloy_trie::EMPTY_ROOT_HASH);
        assert_eq!(view.account(&Address::repeat_byte(0xcc)), None);
    }

    #[rstest]
    fn test_absent_storage_reads_zero(store: (MemoryDB, B256)) {
        let (db, root) = store;

        let view = open_state(&db, root).unwrap();

        assert_eq!(view.storage(&CONTRACT, U256::ZERO), U256::from(42));
        assert_eq!(view.storage(&CONTRACT, U256::from(1)), U256::ZERO);
        assert_eq!(view.storage(&EOA, U256::ZERO), U256::ZERO);
    }

    #[rstest]
    fn test_database_ref_matches_view(store: (MemoryDB, B256)) {
        let (db, root) = store;

        let view = open_state(&db, root).unwrap();

        let info = view.basic_ref(CONTRACT).unwrap().unwrap();
        assert_eq!(
            view.code_by_hash_ref(info.code_hash)
                .unwrap()
                .original_bytes(),
            code()
        );
        assert_eq!(view.storage_ref(CONTRACT, U256::ZERO).unwrap(), U256::from(42));
        assert!(view.basic_ref(Address::ZERO).unwrap().is_none());
        assert!(matches!(
            view.code_by_hash_ref(B256::repeat_byte(1)),
            Err(StoreError::MissingCode(_))
        ));
    }

    #[rstest]
    fn test_block_hash_from_headers(store: (MemoryDB, B256)) {
        let (db, root) = store;
        db.insert_header(crate::models::BlockHeader {
            number: 3,
            hash: B256::repeat_byte(0x33),
            parent_hash: B256::ZERO,
            state_root: root,
            timestamp: 36,
            beneficiary: Address::ZERO,
            gas_limit: 30_000_000,
            base_fee_per_gas: None,
            difficulty: U256::ZERO,
            mix_hash: B256::ZERO,
            excess_blob_gas: None,
        });

        let view = open_state(&db, root).unwrap();

        assert_eq!(view.block_hash_ref(3).unwrap(), B256::repeat_byte(0x33));
        assert_eq!(view.block_hash_ref(4).unwrap(), B256::ZERO);
    }

    #[test]
    fn test_malformed_code_fails_to_open() {
        let db = MemoryDB::new();
        let mut snapshot = StateSnapshot::default();
        let code = Bytes::from_static(&[0xef, 0x00, 0x01]);
        snapshot.insert_account(CONTRACT, U256::ZERO, 1, code.clone(), Vec::new());
        let root = db.insert_state(snapshot);

        let err = open_state(&db, root).unwrap_err();

        assert!(matches!(err, StoreError::InvalidCode { hash, .. } if hash == keccak256(&code)));
    }

    #[rstest]
    fn test_accounts_share_decoded_code(store: (MemoryDB, B256)) {
        let (db, root) = store;

        let view = open_state(&db, root).unwrap();

        let info = view.basic_ref(CONTRACT).unwrap().unwrap();
        assert_eq!(info.code, Some(view.code_by_hash_ref(info.code_hash).unwrap()));
    }

    #[test]
    fn test_unknown_root_fails() {
        let db = MemoryDB::new();

        let err = open_state(&db, B256::repeat_byte(7)).unwrap_err();

        assert!(matches!(err, StoreError::MissingState(_)));
    }
}
