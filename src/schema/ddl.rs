//! CREATE and ALTER TABLE statements derived from record column specs.

use crate::db::Session;
use crate::db::sql::{qualified_table, quote_ident};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSpec, Param, TableRecord};
use tracing::debug;

/// Options for [`create_table_sql`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTable {
    pub if_not_exists: bool,
    /// Column placed first and declared as PRIMARY KEY.
    pub primary_key: Option<String>,
    /// Storage engine; the server default when unset.
    pub engine: Option<String>,
}

impl CreateTable {
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }
}

fn creatable_columns<T: TableRecord>() -> Vec<(&'static ColumnSpec, &'static str)> {
    T::columns()
        .iter()
        .filter_map(|c| c.create_type.map(|ty| (c, ty)))
        .collect()
}

/// CREATE TABLE for every column of `T` that declares a CREATE type.
pub fn create_table_sql<T: TableRecord>(
    database: &str,
    table: &str,
    options: &CreateTable,
) -> DbResult<String> {
    let mut columns = creatable_columns::<T>();
    if columns.is_empty() {
        return Err(DbError::invalid_input(
            "Record declares no column with a CREATE type",
        ));
    }

    if let Some(key) = &options.primary_key {
        let pos = columns
            .iter()
            .position(|(c, _)| c.name.eq_ignore_ascii_case(key))
            .ok_or_else(|| {
                DbError::schema(
                    format!("Primary key '{}' is not a column with a CREATE type", key),
                    key.clone(),
                )
            })?;
        let key_column = columns.remove(pos);
        columns.insert(0, key_column);
    }

    let mut parts: Vec<String> = columns
        .iter()
        .map(|(c, ty)| format!("{} {}", quote_ident(c.name), ty))
        .collect();
    if let Some((key_column, _)) = options.primary_key.as_ref().and(columns.first()) {
        parts.push(format!("PRIMARY KEY ({})", quote_ident(key_column.name)));
    }

    let mut sql = format!(
        "CREATE TABLE {}{} ({})",
        if options.if_not_exists { "IF NOT EXISTS " } else { "" },
        qualified_table(database, table),
        parts.join(", ")
    );
    if let Some(engine) = &options.engine {
        if engine.is_empty() || !engine.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbError::invalid_input(format!("Invalid storage engine '{}'", engine)));
        }
        sql.push_str(" ENGINE=");
        sql.push_str(engine);
    }
    Ok(sql)
}

/// ALTER TABLE statements that bring a table with `existing_columns` in line
/// with `T`.
///
/// Record columns with a CREATE type that the table lacks are added. With
/// `drop_unused`, table columns unknown to the record are dropped. Names are
/// compared case-insensitively.
pub fn alter_table_statements<T: TableRecord>(
    existing_columns: &[String],
    database: &str,
    table: &str,
    drop_unused: bool,
) -> Vec<String> {
    let target = qualified_table(database, table);
    let record_columns = T::columns();
    let mut statements = Vec::new();

    if drop_unused {
        for existing in existing_columns {
            let known = record_columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(existing));
            if !known {
                statements.push(format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    target,
                    quote_ident(existing)
                ));
            }
        }
    }

    for (column, create_type) in creatable_columns::<T>() {
        let present = existing_columns
            .iter()
            .any(|e| e.eq_ignore_ascii_case(column.name));
        if !present {
            statements.push(format!(
                "ALTER TABLE {} ADD {} {}",
                target,
                quote_ident(column.name),
                create_type
            ));
        }
    }

    statements
}

/// Read the table's current columns and compute the ALTER statements for `T`.
pub async fn sync_table_statements<T, S>(
    session: &mut S,
    database: &str,
    table: &str,
    drop_unused: bool,
) -> DbResult<Vec<String>>
where
    T: TableRecord,
    S: Session,
{
    let existing: Vec<String> = session
        .get_column(
            "SELECT `COLUMN_NAME` FROM `information_schema`.`COLUMNS` \
             WHERE `TABLE_SCHEMA` = @database AND `TABLE_NAME` = @table \
             ORDER BY `ORDINAL_POSITION`",
            0usize,
            true,
            &[Param::new("database", database), Param::new("table", table)],
        )
        .await?;
    let statements = alter_table_statements::<T>(&existing, database, table, drop_unused);
    debug!(
        session_id = session.session_id(),
        database,
        table,
        existing = existing.len(),
        statements = statements.len(),
        "Computed table sync statements"
    );
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Item {
        id: i64,
        label: String,
        cached: Option<String>,
    }

    crate::impl_table_record!(Item {
        label: "label" => "VARCHAR(32) NOT NULL";
        id: "id" => "INT NOT NULL AUTO_INCREMENT";
        cached: "cached";
    });

    #[test]
    fn test_create_table_puts_primary_key_first() {
        let sql = create_table_sql::<Item>(
            "app",
            "items",
            &CreateTable::default().primary_key("ID").engine("InnoDB"),
        )
        .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE `app`.`items` (`id` INT NOT NULL AUTO_INCREMENT, \
             `label` VARCHAR(32) NOT NULL, PRIMARY KEY (`id`)) ENGINE=InnoDB"
        );
    }

    #[test]
    fn test_create_table_without_key() {
        let sql =
            create_table_sql::<Item>("app", "items", &CreateTable::default().if_not_exists())
                .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `app`.`items` (`label` VARCHAR(32) NOT NULL, \
             `id` INT NOT NULL AUTO_INCREMENT)"
        );
    }

    #[test]
    fn test_create_table_unknown_key() {
        let err = create_table_sql::<Item>(
            "app",
            "items",
            &CreateTable::default().primary_key("cached"),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    #[test]
    fn test_create_table_rejects_bad_engine() {
        let options = CreateTable::default().engine("InnoDB; DROP TABLE x");
        assert!(create_table_sql::<Item>("app", "items", &options).is_err());
    }

    #[test]
    fn test_alter_adds_missing_columns() {
        let existing = vec!["ID".to_string()];
        let statements = alter_table_statements::<Item>(&existing, "app", "items", false);
        assert_eq!(
            statements,
            vec!["ALTER TABLE `app`.`items` ADD `label` VARCHAR(32) NOT NULL".to_string()]
        );
    }

    #[test]
    fn test_alter_drops_unknown_columns_on_request() {
        let existing = vec![
            "id".to_string(),
            "label".to_string(),
            "cached".to_string(),
            "legacy".to_string(),
        ];
        assert!(alter_table_statements::<Item>(&existing, "app", "items", false).is_empty());
        assert_eq!(
            alter_table_statements::<Item>(&existing, "app", "items", true),
            vec!["ALTER TABLE `app`.`items` DROP COLUMN `legacy`".to_string()]
        );
    }

    #[test]
    fn test_alter_prefix_name_is_not_a_match() {
        let existing = vec!["id".to_string(), "label_old".to_string()];
        let statements = alter_table_statements::<Item>(&existing, "app", "items", false);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("ADD `label`"));
    }
}
