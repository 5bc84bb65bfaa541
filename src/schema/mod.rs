//! Schema helpers.
//!
//! This module provides:
//! - DDL generation from record column specs
//! - Table change detection (update time, checksum)
//! - An in-memory column catalog
//! - A cached server clock

pub mod catalog;
pub mod changes;
pub mod clock;
pub mod ddl;

pub use catalog::{ColumnCatalog, ColumnEntry};
pub use changes::{ChecksumWatcher, MissingTable, TableUpdateTime, TableUpdateTimeCache};
pub use clock::ServerClock;
pub use ddl::{CreateTable, alter_table_statements, create_table_sql, sync_table_statements};
