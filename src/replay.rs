//! The replay pipeline: validate, locate, open state, build context, execute.
use tracing::{info, instrument};

use crate::{
    config::ReplayConfig,
    errors::ReplayError,
    evm::{
        chain_spec::ChainSpec,
        context::{CallRequest, ExecutionContextBuilder},
        engine_db::{
            archive_db::ArchiveDB, engine_db_interface::ChainStore, snapshot_db::open_state,
        },
        locator::HistoricalLocator,
        simulation::{CallEngine, CallResult, SimulationEngine},
    },
};

/// Runs the replay described by `config` against the archive at `config.db_dir`.
///
/// The request is validated before the archive is opened.
pub fn run(config: &ReplayConfig) -> Result<CallResult, ReplayError> {
    let builder = ExecutionContextBuilder::new(&config.request)?;
    let store = ArchiveDB::open_read_only(&config.db_dir)?;
    let engine = SimulationEngine::new(config.trace);
    execute(&store, &engine, config.chain.spec(), &builder)
}

/// Replays one message call against the state a historical block produced.
///
/// The request is fully validated before `store` is touched. Every stage runs once, in order, and
/// the first fatal error is returned as is.
///
/// # Errors
///
/// `ReplayError::Usage` for an invalid request, `ReplayError::Store` if the block or its state
/// cannot be read and `ReplayError::Engine` if the VM rejects the block environment. A call that
/// reverts or runs out of gas is `Ok`.
pub fn replay_call<S, E>(
    store: &S,
    engine: &E,
    chain: &ChainSpec,
    request: &CallRequest,
) -> Result<CallResult, ReplayError>
where
    S: ChainStore + ?Sized,
    E: CallEngine,
{
    let builder = ExecutionContextBuilder::new(request)?;
    execute(store, engine, chain, &builder)
}

#[instrument(skip_all, fields(block = builder.block_number))]
fn execute<S, E>(
    store: &S,
    engine: &E,
    chain: &ChainSpec,
    builder: &ExecutionContextBuilder,
) -> Result<CallResult, ReplayError>
where
    S: ChainStore + ?Sized,
    E: CallEngine,
{
    let (header, state_root) = HistoricalLocator::new(store).locate(builder.block_number)?;
    let ctx = builder.build(&header, chain)?;
    let view = open_state(store, state_root)?;
    info!(number = header.number, %state_root, spec = ?ctx.spec_id, "Replaying call");
    engine.call(&view, &ctx)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy_primitives::{Address, Bytes, B256, U256};
    use revm::DatabaseRef;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        errors::{AddressRole, StoreError, UsageError},
        evm::{
            chain_spec::DEV,
            context::ExecutionContext,
            engine_db::{
                engine_db_interface::{HeaderReader, StateProvider, StateView},
                memory_db::MemoryDB,
            },
            simulation::SimulationResult,
        },
        models::{BlockHeader, StateSnapshot},
    };

    const SENDER: Address = Address::repeat_byte(0x11);
    const RECEIVER: Address = Address::repeat_byte(0x22);

    /// A store that fails the test whenever it is read.
    struct PanickingStore;

    impl HeaderReader for PanickingStore {
        fn head_hash(&self) -> Result<B256, StoreError> {
            panic!("store must not be read")
        }

        fn header_by_number(&self, _number: u64) -> Result<Option<BlockHeader>, StoreError> {
            panic!("store must not be read")
        }
    }

    impl StateProvider for PanickingStore {
        fn state_at(&self, _root: B256) -> Result<StateSnapshot, StoreError> {
            panic!("store must not be read")
        }
    }

    /// Deterministic engine answering with the receiver's balance and slot 0, followed by the
    /// block number and the input.
    #[derive(Default)]
    struct StubEngine {
        calls: AtomicUsize,
    }

    impl CallEngine for StubEngine {
        fn call<V>(&self, view: &V, ctx: &ExecutionContext) -> Result<CallResult, ReplayError>
        where
            V: StateView + DatabaseRef<Error = StoreError>,
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let balance = view
                .account(&ctx.target)
                .map(|account| account.balance)
                .unwrap_or_default();
            let mut out = balance.to_be_bytes::<32>().to_vec();
            out.extend(view.storage(&ctx.target, U256::ZERO).to_be_bytes::<32>());
            out.extend(ctx.block.number.to_be_bytes());
            out.extend(ctx.input.iter());
            Ok(CallResult::Success(SimulationResult { result: Bytes::from(out), gas_used: 0 }))
        }
    }

    fn header(number: u64, state_root: B256) -> BlockHeader {
        BlockHeader {
            number,
            hash: B256::with_last_byte(number as u8 + 1),
            parent_hash: B256::with_last_byte(number as u8),
            state_root,
            timestamp: number * 12,
            beneficiary: Address::ZERO,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(7),
            difficulty: U256::ZERO,
            mix_hash: B256::ZERO,
            excess_blob_gas: Some(0),
        }
    }

    fn state(balance: u64, slot: u64) -> StateSnapshot {
        let mut snapshot = StateSnapshot::default();
        snapshot.insert_account(SENDER, U256::from(1), 0, Bytes::new(), Vec::new());
        snapshot.insert_account(
            RECEIVER,
            U256::from(balance),
            1,
            Bytes::from_static(&[0x00]),
            [(U256::ZERO, U256::from(slot))],
        );
        snapshot
    }

    /// Genesis plus two blocks, each with its own state.
    #[fixture]
    fn store() -> MemoryDB {
        let db = MemoryDB::new();
        for (number, (balance, slot)) in [(0, (0, 0)), (1, (100, 1)), (2, (200, 2))] {
            let root = db.insert_state(state(balance, slot));
            db.insert_header(header(number, root));
        }
        db
    }

    fn request(block_number: u64) -> CallRequest {
        CallRequest {
            block_number: Some(block_number),
            sender: Some(SENDER.to_string()),
            receiver: Some(RECEIVER.to_string()),
            payload: vec![b"in".to_vec()],
            ..Default::default()
        }
    }

    fn expected(balance: u64, slot: u64, number: u64) -> CallResult {
        let mut out = U256::from(balance).to_be_bytes::<32>().to_vec();
        out.extend(U256::from(slot).to_be_bytes::<32>());
        out.extend(number.to_be_bytes());
        out.extend(b"in");
        CallResult::Success(SimulationResult { result: Bytes::from(out), gas_used: 0 })
    }

    #[rstest]
    #[case(1, 100, 1)]
    #[case(2, 200, 2)]
    fn test_replays_against_historical_state(
        store: MemoryDB,
        #[case] number: u64,
        #[case] balance: u64,
        #[case] slot: u64,
    ) {
        let engine = StubEngine::default();

        let result = replay_call(&store, &engine, &DEV, &request(number)).unwrap();

        assert_eq!(result, expected(balance, slot, number));
    }

    #[rstest]
    fn test_replay_is_deterministic(store: MemoryDB) {
        let engine = StubEngine::default();

        let first = replay_call(&store, &engine, &DEV, &request(1)).unwrap();
        let second = replay_call(&store, &engine, &DEV, &request(1)).unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[case::genesis(
        CallRequest { block_number: Some(0), ..request(1) },
        UsageError::GenesisBlock
    )]
    #[case::zero_sender(
        CallRequest { sender: Some(Address::ZERO.to_string()), ..request(1) },
        UsageError::InvalidAddress { role: AddressRole::Sender, reason: "zero address".to_string() }
    )]
    #[case::zero_receiver(
        CallRequest { receiver: None, ..request(1) },
        UsageError::InvalidAddress { role: AddressRole::Receiver, reason: "zero address".to_string() }
    )]
    #[case::two_payloads(
        CallRequest { payload: vec![b"a".to_vec(), b"b".to_vec()], ..request(1) },
        UsageError::PayloadArity(2)
    )]
    fn test_usage_errors_never_touch_store(
        #[case] request: CallRequest,
        #[case] expected: UsageError,
    ) {
        let engine = StubEngine::default();

        let err = replay_call(&PanickingStore, &engine, &DEV, &request).unwrap_err();

        assert!(matches!(err, ReplayError::Usage(ref usage) if *usage == expected));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn test_missing_block_is_store_error(store: MemoryDB) {
        let engine = StubEngine::default();

        let err = replay_call(&store, &engine, &DEV, &request(3)).unwrap_err();

        assert!(matches!(err, ReplayError::Store(StoreError::BlockNotFound(3))));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unmaterialisable_state_is_store_error() {
        let db = MemoryDB::new();
        db.insert_header(header(1, B256::repeat_byte(0x55)));
        let engine = StubEngine::default();

        let err = replay_call(&db, &engine, &DEV, &request(1)).unwrap_err();

        assert!(matches!(err, ReplayError::Store(StoreError::MissingState(_))));
    }

    #[test]
    fn test_run_validates_before_opening_archive() {
        let config = ReplayConfig {
            db_dir: "/nonexistent/chaindata".into(),
            chain: crate::evm::chain_spec::Chain::Dev,
            trace: false,
            request: CallRequest { payload: vec![b"a".to_vec(), b"b".to_vec()], ..request(1) },
        };

        let err = run(&config).unwrap_err();

        assert!(matches!(err, ReplayError::Usage(UsageError::PayloadArity(2))));
    }

    #[test]
    fn test_run_reports_unopenable_archive() {
        let config = ReplayConfig {
            db_dir: "/nonexistent/chaindata".into(),
            chain: crate::evm::chain_spec::Chain::Dev,
            trace: false,
            request: request(1),
        };

        let err = run(&config).unwrap_err();

        assert!(matches!(err, ReplayError::Store(StoreError::Open { .. })));
    }
}
