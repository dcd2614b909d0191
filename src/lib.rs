// Library interface for testing

// Declare all modules
pub mod artifacts;
pub mod browser;
pub mod config;
pub mod constants;
pub mod db;
pub mod diff;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod queries;
pub mod run_log;
pub mod schedule;
pub mod schema;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
