//! Command line configuration.
//!
//! The command line is parsed once into a [`ReplayConfig`] which is then passed down explicitly.
use std::{ffi::OsString, path::PathBuf};

use clap::Parser;

use crate::evm::{
    chain_spec::Chain,
    context::{CallRequest, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE},
};

/// Replay a single message call against the state of a historical block.
#[derive(Parser, Debug)]
#[command(name = "historical-call", version, about, long_about = None)]
pub struct Cli {
    /// Path to the chain database, opened read-only
    #[arg(long, alias = "db_dir", default_value = "chaindata")]
    pub db_dir: PathBuf,

    /// Block whose post-execution state the call runs against. Must be greater than 0
    #[arg(long, alias = "blknum")]
    pub block_number: Option<u64>,

    /// Address the call is sent from
    #[arg(long)]
    pub sender: Option<String>,

    /// Address of the account or contract being called
    #[arg(long)]
    pub receiver: Option<String>,

    /// Gas available to the called code
    #[arg(long, alias = "limit", default_value_t = DEFAULT_GAS_LIMIT)]
    pub gas_limit: u64,

    /// Gas price in wei
    #[arg(long, alias = "gasPrice", default_value_t = DEFAULT_GAS_PRICE)]
    pub gas_price: u128,

    /// Fork schedule used to pick the EVM rules for the block
    #[arg(long, value_enum, default_value_t = Chain::Mainnet)]
    pub chain: Chain,

    /// Write the call trace to stderr
    #[arg(long)]
    pub trace: bool,

    /// Call input. Passed to the receiver byte for byte as typed: it is NOT hex-decoded, so
    /// `0xabcd` is sent as the six bytes `0`, `x`, `a`, `b`, `c`, `d`
    #[arg(value_name = "INPUT")]
    pub payload: Vec<OsString>,
}

/// Everything a replay needs, resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub db_dir: PathBuf,
    pub chain: Chain,
    pub trace: bool,
    pub request: CallRequest,
}

impl Cli {
    /// Converts parsed arguments into a config. No validation happens here, the request is
    /// checked as a whole before anything is read.
    pub fn into_config(self) -> ReplayConfig {
        ReplayConfig {
            db_dir: self.db_dir,
            chain: self.chain,
            trace: self.trace,
            request: CallRequest {
                block_number: self.block_number,
                sender: self.sender,
                receiver: self.receiver,
                payload: self
                    .payload
                    .into_iter()
                    .map(OsString::into_encoded_bytes)
                    .collect(),
                gas_limit: self.gas_limit,
                gas_price: self.gas_price,
            },
        }
    }
}
