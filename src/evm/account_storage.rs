use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use revm::{
    interpreter::analysis::to_analysed,
    primitives::{AccountInfo, Bytecode, KECCAK_EMPTY},
};

use crate::{
    errors::StoreError,
    models::{SnapshotAccount, StateSnapshot},
};

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Account {
    pub info: AccountInfo,
    pub storage: HashMap<U256, U256>,
}

/// Accounts of a single state root, held in the shape revm reads them.
///
/// Filled once when a root is materialised and never written afterwards.
#[derive(Clone, Default, Debug)]
pub struct AccountStorage {
    accounts: HashMap<Address, Account>,
}

impl AccountStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialises every account of a snapshot.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The accounts to materialise.
    /// * `codes` - Decoded bytecode by hash, as returned by [`decode_codes`]. Accounts share these
    ///   instances instead of decoding their code again.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingCode` if an account references a code hash `codes` does not
    /// carry.
    pub fn from_snapshot(
        snapshot: &StateSnapshot,
        codes: &HashMap<B256, Bytecode>,
    ) -> Result<Self, StoreError> {
        let mut storage = Self::new();
        for (address, account) in snapshot.accounts.iter() {
            let info = account_info(codes, account)?;
            storage.init_account(
                *address,
                info,
                Some(
                    account
                        .storage
                        .iter()
                        .map(|(slot, value)| (*slot, *value))
                        .collect(),
                ),
            );
        }
        Ok(storage)
    }

    /// Inserts account data into the current instance, replacing any previous entry.
    ///
    /// # Arguments
    ///
    /// * `address` - The address of the account to insert.
    /// * `info` - The account information to insert.
    /// * `storage` - Optional storage information associated with the account.
    pub fn init_account(
        &mut self,
        address: Address,
        info: AccountInfo,
        storage: Option<HashMap<U256, U256>>,
    ) {
        self.accounts
            .insert(address, Account { info, storage: storage.unwrap_or_default() });
    }

    pub fn get_account_info(&self, address: &Address) -> Option<&AccountInfo> {
        self.accounts
            .get(address)
            .map(|acc| &acc.info)
    }

    /// Retrieves the value of a storage slot, `None` if the account or slot is unknown.
    pub fn get_storage(&self, address: &Address, index: &U256) -> Option<U256> {
        self.accounts
            .get(address)
            .and_then(|acc| acc.storage.get(index).copied())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Decodes stored bytecode and analyses legacy code for jump destinations.
///
/// # Errors
///
/// Returns `StoreError::InvalidCode` if the code carries an EOF or EIP-7702 prefix but is not a
/// well-formed container of that kind.
pub fn decode_code(hash: B256, code: &Bytes) -> Result<Bytecode, StoreError> {
    Bytecode::new_raw_checked(code.clone())
        .map(to_analysed)
        .map_err(|err| StoreError::InvalidCode { hash, reason: err.to_string() })
}

/// Decodes every bytecode a snapshot carries, keyed by code hash.
pub fn decode_codes(snapshot: &StateSnapshot) -> Result<HashMap<B256, Bytecode>, StoreError> {
    snapshot
        .codes
        .iter()
        .map(|(hash, code)| Ok((*hash, decode_code(*hash, code)?)))
        .collect()
}

fn account_info(
    codes: &HashMap<B256, Bytecode>,
    account: &SnapshotAccount,
) -> Result<AccountInfo, StoreError> {
    if account.code_hash == KECCAK_EMPTY {
        return Ok(AccountInfo {
            balance: account.balance,
            nonce: account.nonce,
            code_hash: account.code_hash,
            code: Some(Bytecode::default()),
        });
    }
    let code = codes
        .get(&account.code_hash)
        .ok_or(StoreError::MissingCode(account.code_hash))?;
    Ok(AccountInfo::new(account.balance, account.nonce, account.code_hash, code.clone()))
}
