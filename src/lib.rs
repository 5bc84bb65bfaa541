//! MySQL helper library
//!
//! A convenience layer over `sqlx` for MySQL: connection options, per-call
//! and held-connection sessions sharing one set of query operations, typed
//! record mapping, and helpers that detect table changes.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;

pub use config::{Config, ConnectionOptions};
pub use db::{
    BulkOptions, IsolationLevel, MultiConnection, QueryStats, Session, SingleConnection,
    TransactionMode,
};
pub use error::{DbError, DbResult};
pub use models::{
    ColumnRef, ColumnSpec, DataRow, DataTable, Filter, FromValue, Param, TableRecord, Value,
};
