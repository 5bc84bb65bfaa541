//! In-memory copy of `information_schema.COLUMNS`.

use crate::db::{MultiConnection, Session};
use crate::error::DbResult;
use crate::impl_table_record;
use std::collections::BTreeSet;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// One (schema, table, column) triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnEntry {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl_table_record!(ColumnEntry {
    schema: "TABLE_SCHEMA", read_only;
    table: "TABLE_NAME", read_only;
    column: "COLUMN_NAME", read_only;
});

const LOAD_SQL: &str = "SELECT `TABLE_SCHEMA`, `TABLE_NAME`, `COLUMN_NAME` \
                        FROM `information_schema`.`COLUMNS` \
                        ORDER BY `TABLE_SCHEMA`, `TABLE_NAME`, `ORDINAL_POSITION`";

/// Catalog of every column visible to the session's user.
///
/// Loaded once on creation; call [`reload`](Self::reload) to refresh.
/// Schema and table lookups ignore ASCII case.
pub struct ColumnCatalog<S: Session = MultiConnection> {
    session: Mutex<S>,
    entries: RwLock<Vec<ColumnEntry>>,
}

impl<S: Session> ColumnCatalog<S> {
    pub async fn load(mut session: S) -> DbResult<Self> {
        let entries = Self::fetch(&mut session).await?;
        Ok(Self {
            session: Mutex::new(session),
            entries: RwLock::new(entries),
        })
    }

    /// Build a catalog from known entries without querying.
    pub fn from_entries(session: S, entries: Vec<ColumnEntry>) -> Self {
        Self {
            session: Mutex::new(session),
            entries: RwLock::new(entries),
        }
    }

    /// Re-read the catalog from the server.
    pub async fn reload(&self) -> DbResult<()> {
        let entries = {
            let mut session = self.session.lock().await;
            Self::fetch(&mut *session).await?
        };
        *self.entries.write().await = entries;
        Ok(())
    }

    async fn fetch(session: &mut S) -> DbResult<Vec<ColumnEntry>> {
        let entries: Vec<ColumnEntry> = session.get_records(LOAD_SQL, &[], true).await?;
        info!(
            session_id = session.session_id(),
            columns = entries.len(),
            "Loaded column catalog"
        );
        Ok(entries)
    }

    pub async fn entries(&self) -> Vec<ColumnEntry> {
        self.entries.read().await.clone()
    }

    /// Distinct schema names, sorted.
    pub async fn databases(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|e| e.schema.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct table names of one schema, sorted.
    pub async fn tables(&self, database: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.schema.eq_ignore_ascii_case(database))
            .map(|e| e.table.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Column names of one table, in table order.
    pub async fn columns(&self, database: &str, table: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.schema.eq_ignore_ascii_case(database) && e.table.eq_ignore_ascii_case(table))
            .map(|e| e.column.clone())
            .collect()
    }

    /// Distinct (schema, table) pairs, sorted.
    pub async fn database_tables(&self) -> Vec<(String, String)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|e| (e.schema.clone(), e.table.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
