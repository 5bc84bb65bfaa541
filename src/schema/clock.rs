//! Server time without a round trip per call.

use crate::db::{MultiConnection, Session};
use crate::error::{DbError, DbResult};
use chrono::{Local, NaiveDateTime, TimeDelta};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Estimates the server's clock from the local one.
///
/// The first call asks the server for `CURRENT_TIMESTAMP` and stores the
/// difference to the local clock; later calls only add that offset.
pub struct ServerClock<S: Session = MultiConnection> {
    session: Mutex<S>,
    offset: OnceCell<TimeDelta>,
}

impl<S: Session> ServerClock<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Mutex::new(session),
            offset: OnceCell::new(),
        }
    }

    /// Server time minus local time.
    pub async fn offset(&self) -> DbResult<TimeDelta> {
        self.offset
            .get_or_try_init(|| async {
                let mut session = self.session.lock().await;
                let server: NaiveDateTime = session
                    .get_object_as("SELECT CURRENT_TIMESTAMP", &[], true)
                    .await?;
                let offset = server - Local::now().naive_local();
                debug!(
                    session_id = session.session_id(),
                    offset_ms = offset.num_milliseconds(),
                    "Measured server clock offset"
                );
                Ok::<_, DbError>(offset)
            })
            .await
            .copied()
    }

    /// Estimated current server time.
    pub async fn now(&self) -> DbResult<NaiveDateTime> {
        let offset = self.offset().await?;
        Ok(Local::now().naive_local() + offset)
    }
}
