//! Execution context construction.
//!
//! Turns the raw request into validated call parameters, then combines them with a located
//! header into the complete environment the engine runs the call in. Nothing here performs I/O.
use std::str::FromStr;

use alloy_primitives::{Address, Bytes, B256, U256};
use revm::primitives::SpecId;
use tracing::debug;

use crate::{
    errors::{AddressRole, ReplayError, UsageError},
    evm::chain_spec::ChainSpec,
    models::BlockHeader,
};

pub const DEFAULT_GAS_LIMIT: u64 = 500_000;
pub const DEFAULT_GAS_PRICE: u128 = 1_000_000_000;

const TX_BASE_GAS: u64 = 21_000;
/// Highest per-byte calldata cost of any fork (non-zero bytes before Istanbul).
const MAX_INPUT_BYTE_GAS: u64 = 68;

/// Largest gas limit that still leaves room for the intrinsic cost of `input` in a `u64`
/// transaction gas limit, under any fork.
pub fn max_gas_limit(input: &[u8]) -> u64 {
    let intrinsic = (input.len() as u64)
        .saturating_mul(MAX_INPUT_BYTE_GAS)
        .saturating_add(TX_BASE_GAS);
    u64::MAX - intrinsic
}

/// A call exactly as requested by the user, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub block_number: Option<u64>,
    /// Address text, `None` if not supplied.
    pub sender: Option<String>,
    pub receiver: Option<String>,
    /// Positional call input arguments as raw bytes. Exactly one is expected.
    pub payload: Vec<Vec<u8>>,
    pub gas_limit: u64,
    pub gas_price: u128,
}

impl Default for CallRequest {
    fn default() -> Self {
        Self {
            block_number: None,
            sender: None,
            receiver: None,
            payload: Vec::new(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
        }
    }
}

/// Rejects the zero address, which this tool reserves as "absent".
pub fn ensure_nonzero(role: AddressRole, address: Address) -> Result<Address, UsageError> {
    if address.is_zero() {
        return Err(UsageError::InvalidAddress { role, reason: "zero address".to_string() });
    }
    Ok(address)
}

/// Parses 20 bytes of hex, with or without `0x`. An omitted address reads as the zero address.
fn parse_address(role: AddressRole, text: Option<&str>) -> Result<Address, UsageError> {
    let address = match text {
        None => Address::ZERO,
        Some(text) => Address::from_str(text.trim()).map_err(|err| {
            UsageError::InvalidAddress { role, reason: format!("{text:?}: {err}") }
        })?,
    };
    ensure_nonzero(role, address)
}

/// Validated parameters of a message call, not yet bound to a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContextBuilder {
    pub block_number: u64,
    pub sender: Address,
    pub receiver: Address,
    pub input: Bytes,
    pub gas_limit: u64,
    pub gas_price: U256,
}

impl ExecutionContextBuilder {
    /// Validates a request.
    ///
    /// Checks run in a fixed order: block number, sender, receiver, payload arity, gas limit. The
    /// first failing check is reported.
    pub fn new(request: &CallRequest) -> Result<Self, UsageError> {
        let block_number = match request.block_number {
            None => return Err(UsageError::MissingBlockNumber),
            Some(0) => return Err(UsageError::GenesisBlock),
            Some(number) => number,
        };
        let sender = parse_address(AddressRole::Sender, request.sender.as_deref())?;
        let receiver = parse_address(AddressRole::Receiver, request.receiver.as_deref())?;
        let input = match request.payload.as_slice() {
            [input] => Bytes::copy_from_slice(input),
            other => return Err(UsageError::PayloadArity(other.len())),
        };
        let max = max_gas_limit(&input);
        if request.gas_limit > max {
            return Err(UsageError::GasLimitTooHigh { limit: request.gas_limit, max });
        }
        Ok(Self {
            block_number,
            sender,
            receiver,
            input,
            gas_limit: request.gas_limit,
            gas_price: U256::from(request.gas_price),
        })
    }

    /// Binds the call to the environment of `header`.
    ///
    /// Pure: the same inputs always produce an identical context.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Engine` if `header` falls under rules the engine cannot replay.
    pub fn build(
        &self,
        header: &BlockHeader,
        chain: &ChainSpec,
    ) -> Result<ExecutionContext, ReplayError> {
        let spec_id = chain.spec_id_at(header.number, header.timestamp)?;
        let post_merge = SpecId::enabled(spec_id, SpecId::MERGE);
        let block = BlockContext {
            number: header.number,
            beneficiary: header.beneficiary,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            base_fee: U256::from(header.base_fee_per_gas.unwrap_or_default()),
            difficulty: if post_merge { U256::ZERO } else { header.difficulty },
            prevrandao: post_merge.then_some(header.mix_hash),
            excess_blob_gas: SpecId::enabled(spec_id, SpecId::CANCUN)
                .then(|| header.excess_blob_gas.unwrap_or_default()),
        };
        debug!(?spec_id, number = header.number, "Built execution context");
        Ok(ExecutionContext {
            spec_id,
            chain_id: chain.chain_id,
            block,
            origin: self.sender,
            target: self.receiver,
            input: self.input.clone(),
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        })
    }
}

/// Block-level fields observable by the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub beneficiary: Address,
    pub timestamp: u64,
    pub gas_limit: u64,
    /// Zero before London.
    pub base_fee: U256,
    /// Zero after the merge.
    pub difficulty: U256,
    /// Set only after the merge.
    pub prevrandao: Option<B256>,
    /// Set only from Cancun onwards.
    pub excess_blob_gas: Option<u64>,
}

/// Everything the engine needs to execute one top-level message call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub spec_id: SpecId,
    pub chain_id: u64,
    pub block: BlockContext,
    /// Address of the sending account
    pub origin: Address,
    /// Address of the receiving account/contract
    pub target: Address,
    /// Calldata
    pub input: Bytes,
    /// Gas available to the called code
    pub gas_limit: u64,
    pub gas_price: U256,
}
