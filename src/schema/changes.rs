//! Table change detection.
//!
//! Three watchers answer "has this table changed since I last asked?":
//! - [`TableUpdateTime`] queries `information_schema.TABLES.UPDATE_TIME` per call
//! - [`TableUpdateTimeCache`] caches UPDATE_TIME for all tables and refreshes
//!   the cache periodically
//! - [`ChecksumWatcher`] compares `CHECKSUM TABLE ... EXTENDED` results
//!
//! The first question about a table always answers `true`. InnoDB may report
//! NULL as UPDATE_TIME; NULL is remembered and compared like any other value.

use crate::db::sql::qualified_table;
use crate::db::{MultiConnection, Session};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnRef, Param};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// (asker, database, table)
type AskerKey = (Option<String>, String, String);

/// Record `current` for `key`; true when it is new or differs from last time.
fn remember<K, V>(seen: &mut HashMap<K, V>, key: K, current: V) -> bool
where
    K: std::hash::Hash + Eq,
    V: PartialEq,
{
    match seen.entry(key) {
        Entry::Vacant(e) => {
            e.insert(current);
            true
        }
        Entry::Occupied(mut e) => {
            if *e.get() == current {
                false
            } else {
                e.insert(current);
                true
            }
        }
    }
}

/// Throttle shared by all tables of one watcher.
#[derive(Debug, Default)]
struct Throttle {
    interval: Option<Duration>,
    last_check: Option<Instant>,
}

impl Throttle {
    /// True when a check may run now; records the check time.
    fn allow(&mut self) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        let now = Instant::now();
        if let Some(last) = self.last_check {
            if now.duration_since(last) < interval {
                return false;
            }
        }
        self.last_check = Some(now);
        true
    }
}

// =============================================================================
// TableUpdateTime
// =============================================================================

struct UpdateTimeState<S> {
    session: S,
    seen: HashMap<AskerKey, Option<NaiveDateTime>>,
    throttle: Throttle,
}

/// Change detection through `UPDATE_TIME`, one query per check.
pub struct TableUpdateTime<S: Session = MultiConnection> {
    state: Mutex<UpdateTimeState<S>>,
}

impl<S: Session> TableUpdateTime<S> {
    pub fn new(session: S) -> Self {
        Self {
            state: Mutex::new(UpdateTimeState {
                session,
                seen: HashMap::new(),
                throttle: Throttle::default(),
            }),
        }
    }

    /// Calls within `interval` of the last check answer `false` without querying.
    pub fn with_min_interval(self, interval: Duration) -> Self {
        let mut state = self.state.into_inner();
        state.throttle.interval = Some(interval);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Whether `database.table` changed since `asker` last asked.
    pub async fn has_changed(
        &self,
        database: &str,
        table: &str,
        asker: Option<&str>,
    ) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        if !state.throttle.allow() {
            return Ok(false);
        }

        let update_time: Option<NaiveDateTime> = state
            .session
            .get_object_as(
                "SELECT `UPDATE_TIME` FROM `information_schema`.`TABLES` \
                 WHERE `TABLE_SCHEMA` = @database AND `TABLE_NAME` = @table LIMIT 1",
                &[Param::new("database", database), Param::new("table", table)],
                true,
            )
            .await?;

        let key = (asker.map(str::to_string), database.to_string(), table.to_string());
        let changed = remember(&mut state.seen, key, update_time);
        debug!(database, table, ?update_time, changed, "Checked table update time");
        Ok(changed)
    }
}

// =============================================================================
// TableUpdateTimeCache
// =============================================================================

/// What [`TableUpdateTimeCache::has_changed`] does for a table it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTable {
    /// Answer `false`.
    #[default]
    ReturnFalse,
    /// Return a not-found error.
    Error,
}

struct CacheState<S> {
    session: S,
    cache: HashMap<(String, String), NaiveDateTime>,
    loaded_at: Option<Instant>,
    seen: HashMap<AskerKey, NaiveDateTime>,
}

/// Change detection through a periodically refreshed copy of `UPDATE_TIME`
/// for every table (or every table of one database).
pub struct TableUpdateTimeCache<S: Session = MultiConnection> {
    state: Mutex<CacheState<S>>,
    only_database: Option<String>,
    refresh_interval: Duration,
    missing: MissingTable,
}

impl<S: Session> TableUpdateTimeCache<S> {
    pub fn new(session: S, refresh_interval: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                session,
                cache: HashMap::new(),
                loaded_at: None,
                seen: HashMap::new(),
            }),
            only_database: None,
            refresh_interval,
            missing: MissingTable::default(),
        }
    }

    /// Only cache the tables of one database.
    pub fn only_database(mut self, database: impl Into<String>) -> Self {
        self.only_database = Some(database.into());
        self
    }

    pub fn missing_table(mut self, policy: MissingTable) -> Self {
        self.missing = policy;
        self
    }

    /// Force a reload on the next check.
    pub async fn invalidate(&self) {
        self.state.lock().await.loaded_at = None;
    }

    /// Whether `database.table` changed since `asker` last asked.
    pub async fn has_changed(
        &self,
        database: &str,
        table: &str,
        asker: Option<&str>,
    ) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        let stale = state
            .loaded_at
            .is_none_or(|at| at.elapsed() >= self.refresh_interval);
        if stale {
            let cache = self.load(&mut state.session).await?;
            state.cache = cache;
            state.loaded_at = Some(Instant::now());
        }

        let Some(update_time) = state
            .cache
            .get(&(database.to_string(), table.to_string()))
            .copied()
        else {
            return match self.missing {
                MissingTable::ReturnFalse => Ok(false),
                MissingTable::Error => Err(DbError::not_found(format!(
                    "Table {}.{} has no update time in information_schema",
                    database, table
                ))),
            };
        };

        let key = (asker.map(str::to_string), database.to_string(), table.to_string());
        Ok(remember(&mut state.seen, key, update_time))
    }

    async fn load(&self, session: &mut S) -> DbResult<HashMap<(String, String), NaiveDateTime>> {
        let (sql, params) = match &self.only_database {
            Some(db) => (
                "SELECT `TABLE_SCHEMA`, `TABLE_NAME`, `UPDATE_TIME` FROM `information_schema`.`TABLES` \
                 WHERE `TABLE_SCHEMA` = @database AND `UPDATE_TIME` IS NOT NULL",
                vec![Param::new("database", db.as_str())],
            ),
            None => (
                "SELECT `TABLE_SCHEMA`, `TABLE_NAME`, `UPDATE_TIME` FROM `information_schema`.`TABLES` \
                 WHERE `UPDATE_TIME` IS NOT NULL",
                Vec::new(),
            ),
        };
        let data = session.get_data_table(sql, &params).await?;
        let mut cache = HashMap::with_capacity(data.len());
        for mut row in data.into_rows() {
            let mut cell = |name: &str| {
                row.take(&ColumnRef::from(name))
                    .ok_or_else(|| DbError::schema("Missing information_schema column", name))
            };
            let schema: String = cell("TABLE_SCHEMA")?.parse()?;
            let table: String = cell("TABLE_NAME")?.parse()?;
            let update_time: NaiveDateTime = cell("UPDATE_TIME")?.parse()?;
            cache.insert((schema, table), update_time);
        }
        debug!(
            session_id = session.session_id(),
            tables = cache.len(),
            "Loaded table update times"
        );
        Ok(cache)
    }
}

// =============================================================================
// ChecksumWatcher
// =============================================================================

struct ChecksumState<S> {
    session: S,
    seen: HashMap<(String, String), Option<i64>>,
    throttle: Throttle,
}

/// Change detection through `CHECKSUM TABLE ... EXTENDED`.
///
/// Works for every storage engine but reads the whole table per check.
pub struct ChecksumWatcher<S: Session = MultiConnection> {
    state: Mutex<ChecksumState<S>>,
}

impl<S: Session> ChecksumWatcher<S> {
    pub fn new(session: S) -> Self {
        Self {
            state: Mutex::new(ChecksumState {
                session,
                seen: HashMap::new(),
                throttle: Throttle::default(),
            }),
        }
    }

    /// Calls within `interval` of the last check answer `false` without querying.
    pub fn with_min_interval(self, interval: Duration) -> Self {
        let mut state = self.state.into_inner();
        state.throttle.interval = Some(interval);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Current checksum; `None` when the server reports NULL (missing table).
    pub async fn checksum(&self, database: &str, table: &str) -> DbResult<Option<i64>> {
        let mut state = self.state.lock().await;
        Self::query_checksum(&mut state.session, database, table).await
    }

    /// Whether the table's checksum differs from the previous check.
    pub async fn has_changed(&self, database: &str, table: &str) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        if !state.throttle.allow() {
            return Ok(false);
        }
        let checksum = Self::query_checksum(&mut state.session, database, table).await?;
        let changed = remember(
            &mut state.seen,
            (database.to_string(), table.to_string()),
            checksum,
        );
        debug!(database, table, ?checksum, changed, "Checked table checksum");
        Ok(changed)
    }

    async fn query_checksum(session: &mut S, database: &str, table: &str) -> DbResult<Option<i64>> {
        let sql = format!("CHECKSUM TABLE {} EXTENDED", qualified_table(database, table));
        let values: Vec<Option<i64>> = session.get_column(&sql, 1usize, true, &[]).await?;
        Ok(values.into_iter().next().flatten())
    }
}
