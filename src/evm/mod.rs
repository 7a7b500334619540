pub mod account_storage;
pub mod chain_spec;
pub mod context;
pub mod engine_db;
pub mod locator;
pub mod simulation;
pub mod trie;
