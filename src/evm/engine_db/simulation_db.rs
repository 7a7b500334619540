use alloy_primitives::{Address, B256, U256};
use revm::{
    primitives::{AccountInfo, Bytecode},
    DatabaseRef,
};
use tracing::debug;

/// Read-only overlay that tops up one account's balance.
///
/// Before executing, revm deducts the up-front gas cost `gas_limit * gas_price` from the caller.
/// A message call is not paid for, so the overlay credits exactly that amount and code running
/// inside the call observes the caller's historical balance.
#[derive(Debug)]
pub struct CallerFundedDB<'a, DB: DatabaseRef> {
    /// Wrapped database. Every query except the caller's account info goes straight to it.
    pub inner_db: &'a DB,
    pub caller: Address,
    pub credit: U256,
}

impl<'a, DB: DatabaseRef> CallerFundedDB<'a, DB> {
    /// Creates a new CallerFundedDB
    ///
    /// # Arguments
    ///
    /// * `inner_db` - Reference to the inner database.
    /// * `caller` - Account whose balance is topped up.
    /// * `credit` - Amount added to the caller's balance.
    pub fn new(inner_db: &'a DB, caller: Address, credit: U256) -> Self {
        CallerFundedDB { inner_db, caller, credit }
    }
}

impl<DB: DatabaseRef> DatabaseRef for CallerFundedDB<'_, DB> {
    type Error = DB::Error;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let info = self.inner_db.basic_ref(address)?;
        if address != self.caller || self.credit.is_zero() {
            return Ok(info);
        }
        let mut info = info.unwrap_or_default();
        info.balance = info
            .balance
            .saturating_add(self.credit);
        debug!(%address, credit = %self.credit, "Credited caller with up-front gas cost");
        Ok(Some(info))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        self.inner_db
            .code_by_hash_ref(code_hash)
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        self.inner_db
            .storage_ref(address, index)
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        self.inner_db.block_hash_ref(number)
    }
}
