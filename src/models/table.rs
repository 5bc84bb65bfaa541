//! In-memory result sets.

use crate::error::{DbError, DbResult};
use crate::models::Value;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Reference to a result column by position or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{}", i),
            ColumnRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Find a column: exact name first, then ASCII case-insensitive.
fn position_of(columns: &[String], column: &ColumnRef) -> Option<usize> {
    match column {
        ColumnRef::Index(i) => (*i < columns.len()).then_some(*i),
        ColumnRef::Name(name) => columns
            .iter()
            .position(|c| c == name)
            .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name))),
    }
}

/// One row of a [`DataTable`]. Shares the column names with its table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl DataRow {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Position of a column in this row.
    pub fn index_of(&self, column: &ColumnRef) -> Option<usize> {
        position_of(&self.columns, column)
    }

    /// Look up a cell.
    pub fn get(&self, column: impl Into<ColumnRef>) -> Option<&Value> {
        self.index_of(&column.into()).map(|i| &self.values[i])
    }

    /// Take a cell out of the row, leaving NULL behind.
    pub fn take(&mut self, column: &ColumnRef) -> Option<Value> {
        self.index_of(column)
            .map(|i| std::mem::take(&mut self.values[i]))
    }

    /// Render the row as a JSON object keyed by column name.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), serde_json::to_value(v).unwrap_or(JsonValue::Null)))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

/// A result set: ordered column names and rows of values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    columns: Arc<[String]>,
    rows: Vec<DataRow>,
}

impl DataTable {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; its length must match the column count.
    pub fn push_row(&mut self, values: Vec<Value>) -> DbResult<()> {
        if values.len() != self.columns.len() {
            return Err(DbError::invalid_input(format!(
                "Row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(DataRow {
            columns: Arc::clone(&self.columns),
            values,
        });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    pub fn column_index(&self, column: &ColumnRef) -> Option<usize> {
        position_of(&self.columns, column)
    }

    /// Value in the first column of the first row.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.values.first())
    }

    /// The rows as a 2-D array of values.
    pub fn to_grid(&self) -> Vec<Vec<Value>> {
        self.rows.iter().map(|r| r.values.clone()).collect()
    }

    /// Consume the table into a 2-D array of values.
    pub fn into_grid(self) -> Vec<Vec<Value>> {
        self.rows.into_iter().map(DataRow::into_values).collect()
    }

    /// The rows as a JSON array of objects.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.rows.iter().map(DataRow::to_json).collect())
    }
}
