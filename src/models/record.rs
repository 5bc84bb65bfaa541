//! Mapping between typed records and table rows.
//!
//! A record type describes its columns once through [`TableRecord`]; the
//! session operations use that description to build SELECT, INSERT and DDL
//! statements and to load result rows into fields. Implementations are
//! normally generated with [`impl_table_record!`](crate::impl_table_record).

use crate::error::{DbError, DbResult};
use crate::models::{ColumnRef, DataRow, FromValue, Param};

/// Mapping metadata for one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name in the database.
    pub name: &'static str,
    /// Loaded from query results.
    pub read: bool,
    /// Sent on insert and update.
    pub write: bool,
    /// Column definition used for CREATE/ALTER TABLE, e.g. `INT NOT NULL`.
    pub create_type: Option<&'static str>,
}

impl ColumnSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            read: true,
            write: true,
            create_type: None,
        }
    }
}

/// A struct stored as a table row.
pub trait TableRecord {
    /// Column metadata in field declaration order.
    fn columns() -> &'static [ColumnSpec];

    /// Parameters for every writable column, named by column.
    fn write_params(&self) -> Vec<Param>;

    /// Assign every readable column found in `row`.
    ///
    /// NULL cells leave the field untouched. A readable column absent from
    /// the row is an error.
    fn load(&mut self, row: &DataRow, parse: bool) -> DbResult<()>;

    fn readable_columns() -> Vec<&'static str> {
        Self::columns()
            .iter()
            .filter(|c| c.read)
            .map(|c| c.name)
            .collect()
    }

    fn writable_columns() -> Vec<&'static str> {
        Self::columns()
            .iter()
            .filter(|c| c.write)
            .map(|c| c.name)
            .collect()
    }
}

/// Load one cell into a record field. Used by `impl_table_record!`.
#[doc(hidden)]
pub fn load_field<T: FromValue>(
    row: &DataRow,
    column: &str,
    parse: bool,
    slot: &mut T,
) -> DbResult<()> {
    let index = row
        .index_of(&ColumnRef::Name(column.to_string()))
        .ok_or_else(|| {
            DbError::schema(
                format!("Column '{}' is missing from the result", column),
                column,
            )
        })?;
    let value = &row.values()[index];
    if value.is_null() {
        return Ok(());
    }
    *slot = value.clone().convert(parse).map_err(|e| {
        DbError::conversion(format!("column '{}': {}", column, e))
    })?;
    Ok(())
}

/// Implement [`TableRecord`] for a struct.
///
/// Each entry maps a field to a column name, optionally followed by a CREATE
/// column type and a `read_only` or `write_only` flag:
///
/// ```
/// use mysql_helper::impl_table_record;
///
/// #[derive(Debug, Default)]
/// struct Player {
///     id: i64,
///     name: String,
///     score: Option<f64>,
/// }
///
/// impl_table_record!(Player {
///     id: "id" => "BIGINT NOT NULL AUTO_INCREMENT", read_only;
///     name: "player_name" => "VARCHAR(64) NOT NULL";
///     score: "score";
/// });
/// ```
///
/// Field types must implement `FromValue` and `Clone`, and `Value` must
/// implement `From` for them.
#[macro_export]
macro_rules! impl_table_record {
    (@read) => { true };
    (@read read_only) => { true };
    (@read write_only) => { false };
    (@write) => { true };
    (@write read_only) => { false };
    (@write write_only) => { true };
    (@create) => { None };
    (@create $create:literal) => { Some($create) };

    ($ty:ty { $( $field:ident : $column:literal $(=> $create:literal)? $(, $flag:ident)? );+ $(;)? }) => {
        impl $crate::models::TableRecord for $ty {
            fn columns() -> &'static [$crate::models::ColumnSpec] {
                const COLUMNS: &[$crate::models::ColumnSpec] = &[
                    $(
                        $crate::models::ColumnSpec {
                            name: $column,
                            read: $crate::impl_table_record!(@read $($flag)?),
                            write: $crate::impl_table_record!(@write $($flag)?),
                            create_type: $crate::impl_table_record!(@create $($create)?),
                        },
                    )+
                ];
                COLUMNS
            }

            fn write_params(&self) -> ::std::vec::Vec<$crate::models::Param> {
                let mut params = ::std::vec::Vec::new();
                $(
                    if $crate::impl_table_record!(@write $($flag)?) {
                        params.push($crate::models::Param::new(
                            $column,
                            $crate::models::Value::from(::std::clone::Clone::clone(&self.$field)),
                        ));
                    }
                )+
                params
            }

            fn load(
                &mut self,
                row: &$crate::models::DataRow,
                parse: bool,
            ) -> $crate::error::DbResult<()> {
                $(
                    if $crate::impl_table_record!(@read $($flag)?) {
                        $crate::models::record::load_field(row, $column, parse, &mut self.$field)?;
                    }
                )+
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataTable, Value};

    #[derive(Debug, Default, PartialEq)]
    struct Player {
        id: i64,
        name: String,
        score: Option<f64>,
        secret: String,
    }

    crate::impl_table_record!(Player {
        id: "id" => "BIGINT NOT NULL AUTO_INCREMENT", read_only;
        name: "player_name" => "VARCHAR(64) NOT NULL";
        score: "score" => "DOUBLE";
        secret: "secret", write_only;
    });

    fn row(columns: &[&str], values: Vec<Value>) -> DataRow {
        let mut table = DataTable::new(columns.iter().copied());
        table.push_row(values).unwrap();
        table.into_rows().remove(0)
    }

    #[test]
    fn test_column_specs() {
        let columns = Player::columns();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "id");
        assert!(columns[0].read && !columns[0].write);
        assert_eq!(columns[0].create_type, Some("BIGINT NOT NULL AUTO_INCREMENT"));
        assert_eq!(columns[3].create_type, None);
        assert!(!columns[3].read && columns[3].write);
        assert_eq!(Player::readable_columns(), vec!["id", "player_name", "score"]);
        assert_eq!(
            Player::writable_columns(),
            vec!["player_name", "score", "secret"]
        );
    }

    #[test]
    fn test_write_params_skip_read_only() {
        let player = Player {
            id: 9,
            name: "ada".to_string(),
            score: None,
            secret: "x".to_string(),
        };
        let params = player.write_params();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["player_name", "score", "secret"]);
        assert_eq!(params[1].value, Value::Null);
    }

    #[test]
    fn test_load_assigns_readable_columns() {
        let mut player = Player::default();
        player
            .load(
                &row(
                    &["id", "PLAYER_NAME", "score"],
                    vec![Value::Int(3), Value::from("bob"), Value::Float(1.5)],
                ),
                false,
            )
            .unwrap();
        assert_eq!(player.id, 3);
        assert_eq!(player.name, "bob");
        assert_eq!(player.score, Some(1.5));
    }

    #[test]
    fn test_load_null_leaves_field() {
        let mut player = Player {
            name: "keep".to_string(),
            score: Some(2.0),
            ..Default::default()
        };
        player
            .load(
                &row(
                    &["id", "player_name", "score"],
                    vec![Value::Int(1), Value::Null, Value::Null],
                ),
                false,
            )
            .unwrap();
        assert_eq!(player.name, "keep");
        assert_eq!(player.score, Some(2.0));
    }

    #[test]
    fn test_load_missing_column_fails() {
        let mut player = Player::default();
        let err = player
            .load(&row(&["id"], vec![Value::Int(1)]), false)
            .unwrap_err();
        assert!(err.to_string().contains("player_name"));
    }

    #[test]
    fn test_load_parse_mode() {
        let mut player = Player::default();
        let row = row(
            &["id", "player_name", "score"],
            vec![Value::from("12"), Value::from("eve"), Value::from("0,5")],
        );
        assert!(player.load(&row, false).is_err());
        player.load(&row, true).unwrap();
        assert_eq!(player.id, 12);
        assert_eq!(player.score, Some(0.5));
    }
}
