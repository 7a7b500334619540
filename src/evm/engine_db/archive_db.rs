use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_primitives::{keccak256, B256};
use revm::primitives::{Bytecode, KECCAK_EMPTY};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::{
    errors::StoreError,
    evm::{
        engine_db::engine_db_interface::{HeaderReader, StateProvider},
        trie,
    },
    models::{BlockHeader, StateSnapshot},
};

const HEAD_FILE: &str = "HEAD";
const HEADERS_DIR: &str = "headers";
const STATE_DIR: &str = "state";

/// Directory-backed chain archive.
///
/// ```text
/// <root>/HEAD                    hash of the canonical head block
/// <root>/headers/<number>.json   one `BlockHeader` per canonical block
/// <root>/state/<root>.json       the `StateSnapshot` a state root resolves to
/// ```
///
/// The archive is only ever read. Every snapshot is checked against the root it is filed under
/// before it is handed out.
#[derive(Debug, Clone)]
pub struct ArchiveDB {
    path: PathBuf,
}

impl ArchiveDB {
    /// Opens an existing archive without modifying it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Open` if `path` does not exist or is not a directory.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let metadata =
            fs::metadata(&path).map_err(|source| StoreError::Open { path: path.clone(), source })?;
        if !metadata.is_dir() {
            return Err(StoreError::Open {
                path,
                source: io::Error::new(io::ErrorKind::Other, "not a directory"),
            });
        }
        info!("Opened chain archive");
        Ok(Self { path })
    }

    fn header_path(&self, number: u64) -> PathBuf {
        self.path
            .join(HEADERS_DIR)
            .join(format!("{number}.json"))
    }

    fn state_path(&self, root: B256) -> PathBuf {
        self.path
            .join(STATE_DIR)
            .join(format!("0x{}.json", hex::encode(root)))
    }
}

/// Reads a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io { path: path.to_path_buf(), source }),
    }
}

fn decode_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes)
        .map_err(|err| StoreError::Corrupt { path: path.to_path_buf(), reason: err.to_string() })
}

impl HeaderReader for ArchiveDB {
    fn head_hash(&self) -> Result<B256, StoreError> {
        let path = self.path.join(HEAD_FILE);
        let Some(bytes) = read_optional(&path)? else {
            debug!("No head marker in archive");
            return Ok(B256::ZERO);
        };
        let text = String::from_utf8_lossy(&bytes);
        B256::from_str(text.trim())
            .map_err(|err| StoreError::Corrupt { path, reason: err.to_string() })
    }

    fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, StoreError> {
        let path = self.header_path(number);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        let header: BlockHeader = decode_json(&path, &bytes)?;
        if header.number != number {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("header is filed under {number} but carries {}", header.number),
            });
        }
        Ok(Some(header))
    }
}

impl StateProvider for ArchiveDB {
    #[instrument(skip(self))]
    fn state_at(&self, root: B256) -> Result<StateSnapshot, StoreError> {
        let path = self.state_path(root);
        let bytes = read_optional(&path)?.ok_or(StoreError::MissingState(root))?;
        let snapshot: StateSnapshot = decode_json(&path, &bytes)?;
        verify_snapshot(&path, root, &snapshot)?;
        debug!(accounts = snapshot.accounts.len(), "Loaded state snapshot");
        Ok(snapshot)
    }
}

/// Checks that a snapshot is complete and is exactly the state `root` commits to.
fn verify_snapshot(path: &Path, root: B256, snapshot: &StateSnapshot) -> Result<(), StoreError> {
    for (hash, code) in snapshot.codes.iter() {
        if keccak256(code) != *hash {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("bytecode filed under {hash} does not hash to it"),
            });
        }
        if let Err(err) = Bytecode::new_raw_checked(code.clone()) {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("bytecode {hash} is malformed: {err}"),
            });
        }
    }
    if let Some(missing) = snapshot
        .accounts
        .values()
        .map(|account| account.code_hash)
        .find(|hash| *hash != KECCAK_EMPTY && !snapshot.codes.contains_key(hash))
    {
        return Err(StoreError::MissingCode(missing));
    }

    let computed = trie::state_root(snapshot);
    if computed != root {
        return Err(StoreError::StateRootMismatch { expected: root, computed });
    }
    Ok(())
}
