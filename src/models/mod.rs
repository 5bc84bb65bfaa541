//! Data models for the MySQL helper.
//!
//! This module re-exports all model types used throughout the library.

pub mod param;
pub mod record;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use param::{Filter, Param};
pub use record::{ColumnSpec, TableRecord};
pub use table::{ColumnRef, DataRow, DataTable};
pub use value::{FromValue, Value, parse_str};
