//! Operations shared by both connection strategies.
//!
//! A session only has to hand out a [`QueryExecutor`]; every query operation
//! is provided on top of it and releases the connection afterwards.

use crate::db::executor::{BulkOptions, QueryExecutor};
use crate::db::stats::QueryStats;
use crate::error::DbResult;
use crate::models::{ColumnRef, DataTable, Filter, FromValue, Param, TableRecord, Value};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a process-unique session id.
pub(crate) fn next_session_id() -> u32 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A way of reaching the server: per-call connections or one held connection.
#[allow(async_fn_in_trait)]
pub trait Session {
    /// Process-unique id used in log fields.
    fn session_id(&self) -> u32;

    /// Counters updated by every statement this session runs.
    fn stats(&self) -> &Arc<QueryStats>;

    /// Lease a connection for one operation.
    async fn executor(&mut self) -> DbResult<QueryExecutor<'_>>;

    async fn send_query(&mut self, sql: &str, params: &[Param]) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec.send_query(sql, params).await;
        exec.finish().await;
        result
    }

    async fn get_object(&mut self, sql: &str, params: &[Param]) -> DbResult<Value> {
        let mut exec = self.executor().await?;
        let result = exec.get_object(sql, params).await;
        exec.finish().await;
        result
    }

    async fn get_object_as<T: FromValue>(
        &mut self,
        sql: &str,
        params: &[Param],
        parse: bool,
    ) -> DbResult<T> {
        let mut exec = self.executor().await?;
        let result = exec.get_object_as(sql, params, parse).await;
        exec.finish().await;
        result
    }

    async fn get_data_table(&mut self, sql: &str, params: &[Param]) -> DbResult<DataTable> {
        let mut exec = self.executor().await?;
        let result = exec.get_data_table(sql, params).await;
        exec.finish().await;
        result
    }

    async fn get_grid(&mut self, sql: &str, params: &[Param]) -> DbResult<Vec<Vec<Value>>> {
        let mut exec = self.executor().await?;
        let result = exec.get_grid(sql, params).await;
        exec.finish().await;
        result
    }

    async fn get_column<T: FromValue>(
        &mut self,
        sql: &str,
        column: impl Into<ColumnRef>,
        parse: bool,
        params: &[Param],
    ) -> DbResult<Vec<T>> {
        let mut exec = self.executor().await?;
        let result = exec.get_column(sql, column, parse, params).await;
        exec.finish().await;
        result
    }

    async fn get_records<T: TableRecord + Default>(
        &mut self,
        sql: &str,
        params: &[Param],
        parse: bool,
    ) -> DbResult<Vec<T>> {
        let mut exec = self.executor().await?;
        let result = exec.get_records(sql, params, parse).await;
        exec.finish().await;
        result
    }

    async fn get_record_map<K, T>(
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
        let mut exec = self.executor().await?;
        let result = exec.get_record_map(key_column, sql, parse, params).await;
        exec.finish().await;
        result
    }

    async fn get_row_into<T: TableRecord>(
        &mut self,
        sql: &str,
        params: &[Param],
        record: &mut T,
        parse: bool,
    ) -> DbResult<()> {
        let mut exec = self.executor().await?;
        let result = exec.get_row_into(sql, params, record, parse).await;
        exec.finish().await;
        result
    }

    async fn read_row_into<T: TableRecord>(
        &mut self,
        database: &str,
        table: &str,
        key_column: &str,
        key: impl Into<Value>,
        record: &mut T,
    ) -> DbResult<()> {
        let key = key.into();
        let mut exec = self.executor().await?;
        let result = exec
            .read_row_into(database, table, key_column, key, record)
            .await;
        exec.finish().await;
        result
    }

    async fn insert_row(
        &mut self,
        database: &str,
        table: &str,
        on_duplicate_update: bool,
        params: &[Param],
    ) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec
            .insert_row(database, table, on_duplicate_update, params)
            .await;
        exec.finish().await;
        result
    }

    async fn insert_record<T: TableRecord>(
        &mut self,
        database: &str,
        table: &str,
        on_duplicate_update: bool,
        record: &T,
    ) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec
            .insert_record(database, table, on_duplicate_update, record)
            .await;
        exec.finish().await;
        result
    }

    async fn update_row(
        &mut self,
        database: &str,
        table: &str,
        values: &[Param],
        filter: Option<&Filter>,
        limit: u64,
    ) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec
            .update_row(database, table, values, filter, limit)
            .await;
        exec.finish().await;
        result
    }

    async fn bulk_send(
        &mut self,
        database: &str,
        table: &str,
        data: &DataTable,
        options: BulkOptions,
    ) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec.bulk_send(database, table, data, options).await;
        exec.finish().await;
        result
    }

    async fn bulk_send_column(
        &mut self,
        database: &str,
        table: &str,
        column: &str,
        values: &[Value],
        options: BulkOptions,
    ) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec
            .bulk_send_column(database, table, column, values, options)
            .await;
        exec.finish().await;
        result
    }

    async fn bulk_send_records<T: TableRecord>(
        &mut self,
        database: &str,
        table: &str,
        records: &[T],
        options: BulkOptions,
    ) -> DbResult<u64> {
        let mut exec = self.executor().await?;
        let result = exec
            .bulk_send_records(database, table, records, options)
            .await;
        exec.finish().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = next_session_id();
        let b = next_session_id();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
