//! Historical call: replay a message call against past EVM state
//!
//! This library answers "what would this call have returned at block N?". It looks up the
//! canonical header of block N in a read-only chain archive, opens the world state identified by
//! that header's state root and executes a single top-level message call against it with revm.
//! Nothing is ever written back: the archive, the state and the result are all independent of
//! previous runs.
//!
//! The pipeline is exposed piece by piece so each stage can be used on its own:
//! [`evm::locator`] finds the block, [`evm::engine_db`] provides the state,
//! [`evm::context`] builds the execution environment, [`evm::simulation`] runs the call and
//! [`report`] renders the outcome. [`replay`] ties them together.
pub mod config;
pub mod errors;
pub mod evm;
pub mod models;
pub mod replay;
pub mod report;
