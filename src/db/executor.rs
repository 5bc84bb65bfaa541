//! Query execution engine.
//!
//! A [`QueryExecutor`] is a short-lived lease on one MySQL connection. It is
//! handed out by a [`Session`](crate::db::Session) for a single operation and
//! provides every query operation on top of two primitives:
//! - `execute_raw`: run a statement and report the affected rows
//! - `fetch_raw`: run a query and collect its rows
//!
//! Both apply the command timeout, count the statement in the session's
//! [`QueryStats`], and log at debug level with the session id. A bulk send
//! counts once however many statements it runs. A statement
//! without arguments is sent as plain text so that batched statements and
//! commands that cannot be prepared keep working.

use crate::config::ConnectionOptions;
use crate::db::params::{bind_value, rewrite_named};
use crate::db::sql::{batch_rows, insert_sql, select_by_key_sql, update_sql};
use crate::db::stats::QueryStats;
use crate::db::types::rows_to_table;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnRef, DataTable, Filter, FromValue, Param, TableRecord, Value,
};
use futures_util::StreamExt;
use sqlx::mysql::{MySqlQueryResult, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor as _, MySql, MySqlConnection};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default number of rows per bulk INSERT statement.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Per-session settings applied to every statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub command_timeout: Duration,
    pub convert_zero_datetime: bool,
}

impl From<&ConnectionOptions> for SessionSettings {
    fn from(options: &ConnectionOptions) -> Self {
        Self {
            command_timeout: options.command_timeout,
            convert_zero_datetime: options.convert_zero_datetime,
        }
    }
}

/// Options for [`QueryExecutor::bulk_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Append `ON DUPLICATE KEY UPDATE` for every sent column.
    pub on_duplicate_update: bool,
    /// Rows per INSERT statement; capped by the placeholder limit.
    pub batch_size: usize,
    /// Retry a failing batch row by row and skip the rows that fail.
    pub continue_on_error: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            on_duplicate_update: false,
            batch_size: DEFAULT_BATCH_SIZE,
            continue_on_error: false,
        }
    }
}

impl BulkOptions {
    pub fn on_duplicate_update(mut self, enabled: bool) -> Self {
        self.on_duplicate_update = enabled;
        self
    }

    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }
}

/// The connection behind an executor.
enum Handle<'a> {
    /// Held by a single-connection session.
    Borrowed(&'a mut MySqlConnection),
    /// Checked out of a pool; returned on drop.
    Pooled(PoolConnection<MySql>),
    /// Opened for this operation only; closed by `finish`.
    Owned(MySqlConnection),
}

impl Handle<'_> {
    fn get(&mut self) -> &mut MySqlConnection {
        match self {
            Handle::Borrowed(conn) => conn,
            Handle::Pooled(conn) => conn,
            Handle::Owned(conn) => conn,
        }
    }
}

/// Lease on a connection that runs query operations.
pub struct QueryExecutor<'a> {
    conn: Handle<'a>,
    stats: &'a QueryStats,
    settings: SessionSettings,
    session_id: u32,
}

impl<'a> QueryExecutor<'a> {
    pub(crate) fn borrowed(
        conn: &'a mut MySqlConnection,
        stats: &'a QueryStats,
        settings: SessionSettings,
        session_id: u32,
    ) -> Self {
        Self {
            conn: Handle::Borrowed(conn),
            stats,
            settings,
            session_id,
        }
    }

    pub(crate) fn pooled(
        conn: PoolConnection<MySql>,
        stats: &'a QueryStats,
        settings: SessionSettings,
        session_id: u32,
    ) -> Self {
        Self {
            conn: Handle::Pooled(conn),
            stats,
            settings,
            session_id,
        }
    }

    pub(crate) fn owned(
        conn: MySqlConnection,
        stats: &'a QueryStats,
        settings: SessionSettings,
        session_id: u32,
    ) -> Self {
        Self {
            conn: Handle::Owned(conn),
            stats,
            settings,
            session_id,
        }
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Release the connection. Connections opened for this operation are
    /// closed; pooled ones go back to the pool.
    pub async fn finish(self) {
        if let Handle::Owned(conn) = self.conn {
            if let Err(e) = conn.close().await {
                warn!(session_id = self.session_id, error = %e, "Failed to close connection");
            }
        }
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    async fn execute_raw(&mut self, sql: &str, args: &[&Value]) -> DbResult<MySqlQueryResult> {
        self.stats.add_queries(1);
        self.run_statement(sql, args).await
    }

    /// Like `execute_raw` without counting a query; affected rows still count
    /// as updates. For operations that send several statements.
    async fn run_statement(&mut self, sql: &str, args: &[&Value]) -> DbResult<MySqlQueryResult> {
        let limit = self.settings.command_timeout;
        debug!(
            session_id = self.session_id,
            sql = %sql,
            params = args.len(),
            timeout_secs = limit.as_secs(),
            "Executing statement"
        );

        let conn = self.conn.get();
        // Without arguments, send plain text (multi-statement batches, DDL)
        let result = if args.is_empty() {
            timeout(limit, conn.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_value(query, arg);
            }
            timeout(limit, query.execute(conn)).await
        };

        match result {
            Ok(Ok(r)) => {
                self.stats.add_updates(r.rows_affected());
                debug!(
                    session_id = self.session_id,
                    rows_affected = r.rows_affected(),
                    "Statement complete"
                );
                Ok(r)
            }
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", limit)),
        }
    }

    async fn fetch_raw(&mut self, sql: &str, args: &[&Value]) -> DbResult<Vec<MySqlRow>> {
        let limit = self.settings.command_timeout;
        debug!(
            session_id = self.session_id,
            sql = %sql,
            params = args.len(),
            timeout_secs = limit.as_secs(),
            "Executing query"
        );
        self.stats.add_queries(1);

        let conn = self.conn.get();
        let rows_future = if args.is_empty() {
            conn.fetch(sql).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_value(query, arg);
            }
            query.fetch(conn).collect::<Vec<_>>()
        };

        match timeout(limit, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", limit)),
        }
    }

    async fn execute_named(&mut self, sql: &str, params: &[Param]) -> DbResult<MySqlQueryResult> {
        let rewritten = rewrite_named(sql, params);
        self.execute_raw(&rewritten.sql, &rewritten.args).await
    }

    async fn fetch_named(&mut self, sql: &str, params: &[Param]) -> DbResult<DataTable> {
        let rewritten = rewrite_named(sql, params);
        let rows = self.fetch_raw(&rewritten.sql, &rewritten.args).await?;
        rows_to_table(&rows, self.settings.convert_zero_datetime)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Run a statement; returns the number of affected rows.
    pub async fn send_query(&mut self, sql: &str, params: &[Param]) -> DbResult<u64> {
        self.execute_named(sql, params)
            .await
            .map(|r| r.rows_affected())
    }

    /// First column of the first row; NULL when the query returns no rows.
    pub async fn get_object(&mut self, sql: &str, params: &[Param]) -> DbResult<Value> {
        let table = self.fetch_named(sql, params).await?;
        Ok(table
            .into_rows()
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or_default())
    }

    /// [`get_object`](Self::get_object) converted to `T`.
    pub async fn get_object_as<T: FromValue>(
        &mut self,
        sql: &str,
        params: &[Param],
        parse: bool,
    ) -> DbResult<T> {
        self.get_object(sql, params).await?.convert(parse)
    }

    pub async fn get_data_table(&mut self, sql: &str, params: &[Param]) -> DbResult<DataTable> {
        self.fetch_named(sql, params).await
    }

    /// The result as a 2-D array of values.
    pub async fn get_grid(&mut self, sql: &str, params: &[Param]) -> DbResult<Vec<Vec<Value>>> {
        Ok(self.fetch_named(sql, params).await?.into_grid())
    }

    /// One column of every row, converted to `T`.
    pub async fn get_column<T: FromValue>(
        &mut self,
        sql: &str,
        column: impl Into<ColumnRef>,
        parse: bool,
        params: &[Param],
    ) -> DbResult<Vec<T>> {
        let column = column.into();
        let table = self.fetch_named(sql, params).await?;
        if table.is_empty() {
            return Ok(Vec::new());
        }
        let index = table.column_index(&column).ok_or_else(|| {
            DbError::schema(
                format!("Column {} is not part of the result", column),
                column.to_string(),
            )
        })?;
        table
            .into_rows()
            .into_iter()
            .map(|row| {
                let value = row.into_values().swap_remove(index);
                value.convert(parse)
            })
            .collect()
    }

    /// Every row loaded into a new record.
    pub async fn get_records<T: TableRecord + Default>(
        &mut self,
        sql: &str,
        params: &[Param],
        parse: bool,
    ) -> DbResult<Vec<T>> {
        let table = self.fetch_named(sql, params).await?;
        table
            .rows()
            .iter()
            .map(|row| {
                let mut record = T::default();
                record.load(row, parse)?;
                Ok(record)
            })
            .collect()
    }

    /// Records keyed by `key_column`. A key seen twice is an error.
    pub async fn get_record_map<K, T>(
        &mut self,
        key_column: &str,
        sql: &str,
        parse: bool,
        params: &[Param],
    ) -> DbResult<HashMap<K, T>>
    where
        K: FromValue + Eq + Hash + std::fmt::Debug,
        T: TableRecord + Default,
    {
        let table = self.fetch_named(sql, params).await?;
        let mut map = HashMap::with_capacity(table.len());
        if table.is_empty() {
            return Ok(map);
        }
        let key_ref = ColumnRef::from(key_column);
        let index = table.column_index(&key_ref).ok_or_else(|| {
            DbError::schema(
                format!("Key column '{}' is not part of the result", key_column),
                key_column,
            )
        })?;
        for row in table.rows() {
            let key: K = row.values()[index].clone().convert(parse)?;
            let mut record = T::default();
            record.load(row, parse)?;
            if map.contains_key(&key) {
                return Err(DbError::invalid_input(format!(
                    "Duplicate key {:?} in column '{}'",
                    key, key_column
                )));
            }
            map.insert(key, record);
        }
        Ok(map)
    }

    /// Load the first row into `record`. No rows is an error.
    pub async fn get_row_into<T: TableRecord>(
        &mut self,
        sql: &str,
        params: &[Param],
        record: &mut T,
        parse: bool,
    ) -> DbResult<()> {
        let table = self.fetch_named(sql, params).await?;
        let row = table
            .rows()
            .first()
            .ok_or_else(|| DbError::not_found("Query returned no rows"))?;
        record.load(row, parse)
    }

    /// SELECT the record's readable columns for one key and load them.
    pub async fn read_row_into<T: TableRecord>(
        &mut self,
        database: &str,
        table: &str,
        key_column: &str,
        key: Value,
        record: &mut T,
    ) -> DbResult<()> {
        let columns = T::readable_columns();
        if columns.is_empty() {
            return Err(DbError::invalid_input("Record has no readable columns"));
        }
        let sql = select_by_key_sql(database, table, &columns, key_column);
        let rows = self.fetch_raw(&sql, &[&key]).await?;
        let data = rows_to_table(&rows, self.settings.convert_zero_datetime)?;
        let row = data.rows().first().ok_or_else(|| {
            DbError::not_found(format!(
                "No row in {}.{} where {} = {}",
                database, table, key_column, key
            ))
        })?;
        record.load(row, false)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert one row; returns the generated auto-increment id (0 if none).
    pub async fn insert_row(
        &mut self,
        database: &str,
        table: &str,
        on_duplicate_update: bool,
        params: &[Param],
    ) -> DbResult<u64> {
        if params.is_empty() {
            return Err(DbError::invalid_input("INSERT needs at least one column"));
        }
        let columns: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        let args: Vec<&Value> = params.iter().map(|p| &p.value).collect();
        let sql = insert_sql(database, table, &columns, 1, on_duplicate_update);
        let result = self.execute_raw(&sql, &args).await?;
        Ok(result.last_insert_id())
    }

    /// Insert the record's writable columns.
    pub async fn insert_record<T: TableRecord>(
        &mut self,
        database: &str,
        table: &str,
        on_duplicate_update: bool,
        record: &T,
    ) -> DbResult<u64> {
        let params = record.write_params();
        self.insert_row(database, table, on_duplicate_update, &params)
            .await
    }

    /// Update columns on rows matching `filter` (all rows without one).
    /// A `limit` of 0 means no LIMIT clause.
    pub async fn update_row(
        &mut self,
        database: &str,
        table: &str,
        values: &[Param],
        filter: Option<&Filter>,
        limit: u64,
    ) -> DbResult<u64> {
        if values.is_empty() {
            return Err(DbError::invalid_input("UPDATE needs at least one column"));
        }
        let columns: Vec<&str> = values.iter().map(|p| p.name.as_str()).collect();
        let mut args: Vec<&Value> = values.iter().map(|p| &p.value).collect();
        let where_clause = filter
            .filter(|f| !f.is_empty())
            .map(|f| rewrite_named(&f.clause, &f.params));
        if let Some(rewritten) = &where_clause {
            args.extend(rewritten.args.iter().copied());
        }
        let sql = update_sql(
            database,
            table,
            &columns,
            where_clause.as_ref().map(|w| w.sql.as_str()),
            limit,
        );
        self.execute_raw(&sql, &args)
            .await
            .map(|r| r.rows_affected())
    }

    /// Insert every row of `data` with multi-row INSERT statements.
    ///
    /// Counts as one query however many statements it sends.
    pub async fn bulk_send(
        &mut self,
        database: &str,
        table: &str,
        data: &DataTable,
        options: BulkOptions,
    ) -> DbResult<u64> {
        if data.columns().is_empty() {
            return Err(DbError::invalid_input("Bulk insert needs at least one column"));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let columns: Vec<&str> = data.columns().iter().map(String::as_str).collect();
        let per_batch = batch_rows(columns.len(), options.batch_size);
        let mut total = 0;
        self.stats.add_queries(1);

        for (batch_no, chunk) in data.rows().chunks(per_batch).enumerate() {
            let sql = insert_sql(database, table, &columns, chunk.len(), options.on_duplicate_update);
            let args: Vec<&Value> = chunk.iter().flat_map(|r| r.values()).collect();
            match self.run_statement(&sql, &args).await {
                Ok(r) => total += r.rows_affected(),
                Err(e) if options.continue_on_error => {
                    warn!(
                        session_id = self.session_id,
                        batch = batch_no,
                        rows = chunk.len(),
                        error = %e,
                        "Bulk batch failed, retrying row by row"
                    );
                    let single = insert_sql(database, table, &columns, 1, options.on_duplicate_update);
                    for (offset, row) in chunk.iter().enumerate() {
                        let args: Vec<&Value> = row.values().iter().collect();
                        match self.run_statement(&single, &args).await {
                            Ok(r) => total += r.rows_affected(),
                            Err(e) => warn!(
                                session_id = self.session_id,
                                row = batch_no * per_batch + offset,
                                error = %e,
                                "Skipping row that failed to insert"
                            ),
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Insert one value per row into a single column.
    pub async fn bulk_send_column(
        &mut self,
        database: &str,
        table: &str,
        column: &str,
        values: &[Value],
        options: BulkOptions,
    ) -> DbResult<u64> {
        let mut data = DataTable::new([column]);
        for value in values {
            data.push_row(vec![value.clone()])?;
        }
        self.bulk_send(database, table, &data, options).await
    }

    /// Insert the writable columns of every record.
    pub async fn bulk_send_records<T: TableRecord>(
        &mut self,
        database: &str,
        table: &str,
        records: &[T],
        options: BulkOptions,
    ) -> DbResult<u64> {
        let mut data = DataTable::new(T::writable_columns());
        for record in records {
            data.push_row(record.write_params().into_iter().map(|p| p.value).collect())?;
        }
        self.bulk_send(database, table, &data, options).await
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_options_builder() {
        let options = BulkOptions::default()
            .on_duplicate_update(true)
            .batch_size(50)
            .continue_on_error(true);
        assert!(options.on_duplicate_update);
        assert_eq!(options.batch_size, 50);
        assert!(options.continue_on_error);
        assert_eq!(BulkOptions::default().batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_session_settings_from_options() {
        let options = ConnectionOptions::new("localhost", "root", "pw")
            .command_timeout(Duration::from_secs(5))
            .convert_zero_datetime(false);
        let settings = SessionSettings::from(&options);
        assert_eq!(settings.command_timeout, Duration::from_secs(5));
        assert!(!settings.convert_zero_datetime);
    }

    #[test]
    fn test_collect_rows_propagates_error() {
        let results: Vec<Result<u8, sqlx::Error>> = vec![Ok(1), Err(sqlx::Error::RowNotFound)];
        assert!(matches!(
            collect_rows(results),
            Err(DbError::NotFound { .. })
        ));
        assert_eq!(collect_rows(vec![Ok::<u8, sqlx::Error>(1)]).unwrap(), vec![1]);
    }

    #[test]
    fn test_timeout_error() {
        let err = timeout_error("query execution", Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timeout: query execution exceeded 30s");
    }
}
