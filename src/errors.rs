//! Replay errors
//!
//! Only conditions that mean "the tool failed" live here. A simulated call that reverts, runs out
//! of gas or halts is a valid outcome and is modelled by
//! [`CallResult`](crate::evm::simulation::CallResult) instead.
use std::{io, path::PathBuf};

use alloy_primitives::B256;
use strum_macros::Display;
use thiserror::Error;

/// The role an address plays in a replayed call.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum AddressRole {
    Sender,
    Receiver,
}

/// Bad invocation parameters. Always detected before the chain database is touched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("block number is required")]
    MissingBlockNumber,
    #[error("block number should not be 0 - replaying against genesis state is not supported")]
    GenesisBlock,
    #[error("invalid {role}: {reason}")]
    InvalidAddress { role: AddressRole, reason: String },
    #[error("expected exactly one call input argument, got {0}")]
    PayloadArity(usize),
    #[error("gas limit {limit} is too high, at most {max} is supported for this input")]
    GasLimitTooHigh { limit: u64, max: u64 },
}

/// Failures while reading the chain database or materialising historical state.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open chain database at {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("head block hash is zero - the chain database was likely never populated")]
    EmptyHead,
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("state for root {0} is not available")]
    MissingState(B256),
    #[error("state root mismatch: expected {expected}, computed {computed}")]
    StateRootMismatch { expected: B256, computed: B256 },
    #[error("bytecode {0} is referenced by state but missing")]
    MissingCode(B256),
    #[error("bytecode {hash} is malformed: {reason}")]
    InvalidCode { hash: B256, reason: String },
    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Represents the top-level, fatal errors of a replay.
///
/// Variants:
/// - `Usage`: the invocation itself is wrong; nothing was read.
/// - `Store`: the chain database could not answer; replaying again yields the same failure.
/// - `Engine`: the VM refused the execution environment (e.g. a header lacks fields the active
///   fork requires).
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("engine error: {0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_errors_name_the_role() {
        let sender = UsageError::InvalidAddress {
            role: AddressRole::Sender,
            reason: "zero address".to_string(),
        };
        let receiver = UsageError::InvalidAddress {
            role: AddressRole::Receiver,
            reason: "zero address".to_string(),
        };

        assert_eq!(sender.to_string(), "invalid sender: zero address");
        assert_eq!(receiver.to_string(), "invalid receiver: zero address");
    }

    #[test]
    fn test_usage_and_store_errors_are_distinguishable() {
        let usage: ReplayError = UsageError::GenesisBlock.into();
        let store: ReplayError = StoreError::BlockNotFound(7).into();

        assert!(usage
            .to_string()
            .starts_with("usage error: "));
        assert_eq!(store.to_string(), "store error: block 7 not found");
    }
}
