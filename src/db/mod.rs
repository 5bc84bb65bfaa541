//! Database access layer.
//!
//! This module provides:
//! - The `Session` trait with every query operation
//! - Per-call (`MultiConnection`) and held (`SingleConnection`) strategies
//! - Query execution with timeouts and statistics
//! - Named parameter binding and SQL builders
//! - Row decoding into `Value`s

pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod session;
pub mod sql;
pub mod stats;
pub mod transaction;
pub mod types;

pub use executor::{BulkOptions, DEFAULT_BATCH_SIZE, QueryExecutor, SessionSettings};
pub use pool::MultiConnection;
pub use session::Session;
pub use stats::QueryStats;
pub use transaction::{IsolationLevel, SingleConnection, TransactionMode};
