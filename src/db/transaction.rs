//! Held connection strategy.
//!
//! [`SingleConnection`] keeps one connection open across calls, optionally
//! inside a transaction that can be committed or rolled back and then
//! restarted at the same isolation level.

use crate::config::ConnectionOptions;
use crate::db::executor::{QueryExecutor, SessionSettings};
use crate::db::pool::open_connection;
use crate::db::session::{Session, next_session_id};
use crate::db::stats::QueryStats;
use crate::error::{DbError, DbResult};
use sqlx::{Connection, Executor as _, MySqlConnection};
use std::fmt;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Whether a held connection runs statements in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Every statement commits on its own.
    Autocommit,
    /// A transaction is started when the session opens.
    Transaction(IsolationLevel),
}

/// Session holding one connection (and optionally a transaction) across calls.
#[derive(Debug)]
pub struct SingleConnection {
    /// `None` only after `close`
    conn: Option<MySqlConnection>,
    stats: Arc<QueryStats>,
    settings: SessionSettings,
    mode: TransactionMode,
    /// Level used by the last `begin`, reused on restart.
    level: IsolationLevel,
    in_transaction: bool,
    id: u32,
}

impl SingleConnection {
    /// Open the connection and, in transaction mode, start a transaction.
    pub async fn open(options: ConnectionOptions, mode: TransactionMode) -> DbResult<Self> {
        Self::open_with_stats(options, mode, Arc::new(QueryStats::new())).await
    }

    /// Like [`open`](Self::open), reporting into shared counters.
    pub async fn open_with_stats(
        options: ConnectionOptions,
        mode: TransactionMode,
        stats: Arc<QueryStats>,
    ) -> DbResult<Self> {
        options.validate()?;
        let id = next_session_id();
        let conn = open_connection(&options, id).await?;
        let mut session = Self {
            conn: Some(conn),
            stats,
            settings: SessionSettings::from(&options),
            mode,
            level: IsolationLevel::default(),
            in_transaction: false,
            id,
        };
        info!(session_id = id, server = %options, mode = ?mode, "Opened single-connection session");
        if let TransactionMode::Transaction(level) = mode {
            session.begin(level).await?;
        }
        Ok(session)
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Start a transaction. Fails if one is already open.
    pub async fn begin(&mut self, level: IsolationLevel) -> DbResult<()> {
        if self.in_transaction {
            return Err(DbError::transaction(
                "A transaction is already open",
                self.id,
            ));
        }
        // Applies to the next transaction only
        let set_level = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
        self.control(&set_level).await?;
        self.control("START TRANSACTION").await?;
        self.level = level;
        self.in_transaction = true;
        debug!(session_id = self.id, level = %level, "Transaction started");
        Ok(())
    }

    /// Commit the open transaction; with `restart`, begin a new one at the
    /// same isolation level.
    pub async fn commit(&mut self, restart: bool) -> DbResult<()> {
        self.end("COMMIT", restart).await
    }

    /// Roll back the open transaction; with `restart`, begin a new one at the
    /// same isolation level.
    pub async fn rollback(&mut self, restart: bool) -> DbResult<()> {
        self.end("ROLLBACK", restart).await
    }

    /// Roll back any open transaction and close the connection.
    pub async fn close(mut self) -> DbResult<()> {
        if self.in_transaction {
            if let Err(e) = self.rollback(false).await {
                warn!(session_id = self.id, error = %e, "Rollback on close failed");
            }
        }
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        info!(
            session_id = self.id,
            queries = self.stats.queries(),
            updates = self.stats.updates(),
            "Closed single-connection session"
        );
        Ok(())
    }

    async fn end(&mut self, statement: &str, restart: bool) -> DbResult<()> {
        if !self.in_transaction {
            return Err(DbError::transaction("No transaction is open", self.id));
        }
        let result = self.control(statement).await;
        // The server ends the transaction even when the reply is lost
        self.in_transaction = false;
        result?;
        info!(session_id = self.id, statement, "Transaction ended");
        if restart {
            self.begin(self.level).await?;
        }
        Ok(())
    }

    /// Run a transaction control statement. These are not counted as queries.
    async fn control(&mut self, sql: &str) -> DbResult<()> {
        let limit = self.settings.command_timeout;
        let session_id = self.id;
        debug!(session_id, sql, "Executing transaction control");
        let conn = self.connection()?;
        match timeout(limit, conn.execute(sql)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DbError::transaction(
                format!("{} failed: {}", sql, e),
                session_id,
            )),
            Err(_) => Err(DbError::timeout(sql, limit.as_secs())),
        }
    }

    fn connection(&mut self) -> DbResult<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::connection("Session is closed", "Open a new session"))
    }
}

impl Session for SingleConnection {
    fn session_id(&self) -> u32 {
        self.id
    }

    fn stats(&self) -> &Arc<QueryStats> {
        &self.stats
    }

    async fn executor(&mut self) -> DbResult<QueryExecutor<'_>> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::connection("Session is closed", "Open a new session"))?;
        Ok(QueryExecutor::borrowed(conn, &self.stats, self.settings, self.id))
    }
}

impl Drop for SingleConnection {
    fn drop(&mut self) {
        if self.in_transaction && self.conn.is_some() {
            warn!(
                session_id = self.id,
                "Session dropped with an open transaction; the server will roll it back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Serializable);
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.to_string(), "REPEATABLE READ");
    }

    #[tokio::test]
    async fn test_open_fails_without_server() {
        let options = ConnectionOptions::new("127.0.0.1", "root", "pw")
            .port(1)
            .connection_attempts(2)
            .connection_sleep(std::time::Duration::from_millis(1))
            .connect_timeout(std::time::Duration::from_secs(2));
        let err = SingleConnection::open(options, TransactionMode::Autocommit)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
