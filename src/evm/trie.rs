//! State root computation.
//!
//! Rebuilds the Merkle-Patricia roots the consensus rules commit to, so a snapshot read from the
//! archive can be checked against the root it is filed under.
use alloy_primitives::{keccak256, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};
use alloy_trie::{HashBuilder, Nibbles, EMPTY_ROOT_HASH};
use itertools::Itertools;

use crate::models::{SnapshotAccount, StateSnapshot};

/// Account leaf as encoded in the state trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable)]
struct TrieAccount {
    nonce: u64,
    balance: U256,
    storage_root: B256,
    code_hash: B256,
}

/// Root of an account's storage trie. Zero-valued slots are not part of the trie.
pub fn storage_root<'a>(storage: impl IntoIterator<Item = (&'a U256, &'a U256)>) -> B256 {
    let leaves = storage
        .into_iter()
        .filter(|(_, value)| !value.is_zero())
        .map(|(slot, value)| (keccak256(slot.to_be_bytes::<32>()), *value))
        .sorted_unstable_by_key(|(hashed_slot, _)| *hashed_slot)
        .collect::<Vec<_>>();
    if leaves.is_empty() {
        return EMPTY_ROOT_HASH;
    }

    let mut hb = HashBuilder::default();
    for (hashed_slot, value) in leaves {
        hb.add_leaf(Nibbles::unpack(hashed_slot), alloy_rlp::encode_fixed_size(&value).as_ref());
    }
    hb.root()
}

/// Storage root of a snapshot account.
pub fn account_storage_root(account: &SnapshotAccount) -> B256 {
    storage_root(account.storage.iter())
}

/// Root of the state trie spanned by all accounts of the snapshot.
pub fn state_root(snapshot: &StateSnapshot) -> B256 {
    if snapshot.accounts.is_empty() {
        return EMPTY_ROOT_HASH;
    }

    let mut hb = HashBuilder::default();
    let mut account_rlp_buf = Vec::new();
    let leaves = snapshot
        .accounts
        .iter()
        .map(|(address, account)| {
            let leaf = TrieAccount {
                nonce: account.nonce,
                balance: account.balance,
                storage_root: account_storage_root(account),
                code_hash: account.code_hash,
            };
            (keccak256(address), leaf)
        })
        .sorted_unstable_by_key(|(hashed_address, _)| *hashed_address);

    for (hashed_address, account) in leaves {
        account_rlp_buf.clear();
        account.encode(&mut account_rlp_buf);
        hb.add_leaf(Nibbles::unpack(hashed_address), &account_rlp_buf);
    }
    hb.root()
}
