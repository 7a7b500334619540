//! Chain databases and the state views the engine executes against.
pub mod archive_db;
pub mod engine_db_interface;
pub mod memory_db;
pub mod simulation_db;
pub mod snapshot_db;
