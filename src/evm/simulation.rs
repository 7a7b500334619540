use alloy_primitives::{Bytes, U256};
use revm::{
    inspector_handle_register,
    interpreter::gas::validate_initial_tx_gas,
    primitives::{
        BlobExcessGasAndPrice, BlockEnv, EVMError, EVMResult, ExecutionResult, HaltReason,
        TransactTo, TxEnv,
    },
    DatabaseRef, Evm,
};
use revm_inspectors::tracing::{TraceWriter, TracingInspector, TracingInspectorConfig};
use strum_macros::Display;
use tracing::{debug, info, instrument, warn};

use crate::{
    errors::{ReplayError, StoreError},
    evm::{
        context::ExecutionContext,
        engine_db::{engine_db_interface::StateView, simulation_db::CallerFundedDB},
    },
};

/// A simulated call that did not return successfully.
///
/// These are valid outcomes of a replay, not errors of the tool.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum SimulationFailure {
    /// The called code reverted. `output` holds the raw revert payload.
    Reverted { output: Bytes, gas_used: u64 },
    /// The supplied gas limit was exhausted.
    OutOfGas { gas_used: u64 },
    /// Execution trapped, e.g. on an invalid opcode or a stack or call-depth limit.
    Halted { reason: String, gas_used: u64 },
    /// The VM refused to start the call.
    Rejected(String),
}

/// A result of a successful call simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationResult {
    /// Output of call execution as bytes
    pub result: Bytes,
    /// Gas used by the called code
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    Success(SimulationResult),
    Failure(SimulationFailure),
}

/// Executes a single top-level message call against an immutable state view.
pub trait CallEngine {
    /// # Errors
    ///
    /// Only failures of the tool itself are errors: the view could not be read or the VM refused
    /// the execution environment. A reverting or trapping call is an `Ok(CallResult::Failure)`.
    fn call<V>(&self, view: &V, ctx: &ExecutionContext) -> Result<CallResult, ReplayError>
    where
        V: StateView + DatabaseRef<Error = StoreError>;
}

/// revm backed call engine
#[derive(Debug, Clone, Default)]
pub struct SimulationEngine {
    pub trace: bool,
}

impl SimulationEngine {
    /// Create a new simulation engine
    ///
    /// # Arguments
    ///
    /// * `trace` - Whether to write the entire call trace to stderr
    pub fn new(trace: bool) -> Self {
        Self { trace }
    }

    fn write_traces(tracer: TracingInspector) {
        let arena = tracer.into_traces();
        let mut writer = TraceWriter::new(std::io::stderr());
        if let Err(err) = writer.write_arena(&arena) {
            warn!(%err, "Failed to write call trace");
        }
    }
}

impl CallEngine for SimulationEngine {
    #[instrument(
        skip_all,
        fields(origin = %ctx.origin, target = %ctx.target, block = ctx.block.number)
    )]
    fn call<V>(&self, view: &V, ctx: &ExecutionContext) -> Result<CallResult, ReplayError>
    where
        V: StateView + DatabaseRef<Error = StoreError>,
    {
        // The called code must see exactly `gas_limit`, so the intrinsic cost revm charges a
        // transaction is added on top and subtracted again from the reported usage.
        let intrinsic_gas = ctx.revm_intrinsic_gas();
        let tx_env = ctx.revm_tx_env(intrinsic_gas);
        let credit = U256::from(tx_env.gas_limit).saturating_mul(tx_env.gas_price);

        // The view is only ever borrowed, the EVM never gets a chance to write to it.
        let db_ref = CallerFundedDB::new(view, ctx.origin, credit);

        let default_builder = Evm::builder()
            .with_spec_id(ctx.spec_id)
            .with_ref_db(db_ref)
            .modify_cfg_env(|cfg| {
                cfg.chain_id = ctx.chain_id;
                cfg.disable_block_gas_limit = true;
                cfg.disable_eip3607 = true;
                cfg.disable_base_fee = true;
            })
            .with_block_env(ctx.revm_block_env())
            .with_tx_env(tx_env);

        let evm_result = if self.trace {
            let mut tracer = TracingInspector::new(TracingInspectorConfig::default());
            let res = {
                let mut vm = default_builder
                    .with_external_context(&mut tracer)
                    .append_handler_register(inspector_handle_register)
                    .build();

                debug!("Starting simulation with tx parameters: {:#?} {:#?}", vm.tx(), vm.block());
                vm.transact()
            };
            Self::write_traces(tracer);
            res
        } else {
            let mut vm = default_builder.build();

            debug!("Starting simulation with tx parameters: {:#?} {:#?}", vm.tx(), vm.block());

            vm.transact()
        };

        let result = interpret_evm_result(evm_result, intrinsic_gas)?;
        info!(?result, "Simulation finished");
        Ok(result)
    }
}

/// Convert a complex EVMResult into a simpler structure
///
/// Reverts, halts and rejected transactions become a `CallResult::Failure`. Only errors of the
/// underlying database or of the execution environment are returned as `Err`.
///
/// # Arguments
///
/// * `evm_result` - output from calling `revm.transact()`
/// * `intrinsic_gas` - gas charged before the called code started, excluded from `gas_used`
fn interpret_evm_result(
    evm_result: EVMResult<StoreError>,
    intrinsic_gas: u64,
) -> Result<CallResult, ReplayError> {
    match evm_result {
        Ok(result_and_state) => Ok(match result_and_state.result {
            ExecutionResult::Success { gas_used, output, .. } => {
                CallResult::Success(SimulationResult {
                    result: output.into_data(),
                    gas_used: gas_used.saturating_sub(intrinsic_gas),
                })
            }
            ExecutionResult::Revert { output, gas_used } => {
                CallResult::Failure(SimulationFailure::Reverted {
                    output,
                    gas_used: gas_used.saturating_sub(intrinsic_gas),
                })
            }
            ExecutionResult::Halt { reason, gas_used } => {
                let gas_used = gas_used.saturating_sub(intrinsic_gas);
                CallResult::Failure(match reason {
                    HaltReason::OutOfGas(_) => SimulationFailure::OutOfGas { gas_used },
                    reason => {
                        SimulationFailure::Halted { reason: halt_reason_message(&reason), gas_used }
                    }
                })
            }
        }),
        Err(evm_error) => match evm_error {
            EVMError::Transaction(invalid_tx) => {
                Ok(CallResult::Failure(SimulationFailure::Rejected(invalid_tx.to_string())))
            }
            EVMError::Database(db_error) => Err(db_error.into()),
            EVMError::Header(err) => Err(ReplayError::Engine(err.to_string())),
            EVMError::Custom(err) => Err(ReplayError::Engine(err)),
            EVMError::Precompile(err) => Err(ReplayError::Engine(err)),
        },
    }
}

fn halt_reason_message(reason: &HaltReason) -> String {
    match reason {
        HaltReason::OpcodeNotFound | HaltReason::InvalidFEOpcode | HaltReason::NotActivated => {
            "invalid opcode".to_string()
        }
        HaltReason::InvalidJump => "invalid jump destination".to_string(),
        HaltReason::StackUnderflow => "stack underflow".to_string(),
        HaltReason::StackOverflow => "stack limit reached".to_string(),
        HaltReason::CallTooDeep => "max call depth exceeded".to_string(),
        HaltReason::StateChangeDuringStaticCall => "write protection".to_string(),
        HaltReason::OutOfFunds => "insufficient balance for transfer".to_string(),
        HaltReason::OutOfOffset => "return data out of bounds".to_string(),
        other => format!("{other:?}"),
    }
}

// Converters of fields to revm types
impl ExecutionContext {
    fn revm_intrinsic_gas(&self) -> u64 {
        validate_initial_tx_gas(self.spec_id, &self.input, false, &[], 0)
    }

    /// The transaction gas limit saturates at `u64::MAX`. Contexts built by
    /// `ExecutionContextBuilder` never reach it, see `context::max_gas_limit`.
    fn revm_tx_env(&self, intrinsic_gas: u64) -> TxEnv {
        TxEnv {
            caller: self.origin,
            gas_limit: self
                .gas_limit
                .saturating_add(intrinsic_gas),
            gas_price: self.gas_price,
            transact_to: TransactTo::Call(self.target),
            value: U256::ZERO,
            data: self.input.clone(),
            // No nonce or chain id: a message call is not a signed transaction.
            nonce: None,
            chain_id: None,
            ..Default::default()
        }
    }

    fn revm_block_env(&self) -> BlockEnv {
        BlockEnv {
            number: U256::from(self.block.number),
            coinbase: self.block.beneficiary,
            timestamp: U256::from(self.block.timestamp),
            gas_limit: U256::from(self.block.gas_limit),
            basefee: self.block.base_fee,
            difficulty: self.block.difficulty,
            prevrandao: self.block.prevrandao,
            blob_excess_gas_and_price: self
                .block
                .excess_blob_gas
                .map(BlobExcessGasAndPrice::new),
        }
    }
}
