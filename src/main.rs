//! mysql-helper - command line front end for the MySQL session helpers.
//!
//! Runs ad-hoc queries, lists the column catalog and watches tables for
//! changes using the library's sessions.

use clap::Parser;
use mysql_helper::config::{Command, Config};
use mysql_helper::db::{
    IsolationLevel, MultiConnection, QueryStats, Session, SingleConnection, TransactionMode,
};
use mysql_helper::error::DbResult;
use mysql_helper::models::Param;
use mysql_helper::schema::{ColumnCatalog, ServerClock, TableUpdateTime};
use mysql_helper::ConnectionOptions;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

fn to_params(params: &[(String, String)]) -> Vec<Param> {
    params
        .iter()
        .map(|(name, value)| Param::new(name.as_str(), value.as_str()))
        .collect()
}

async fn run(options: ConnectionOptions, command: Command) -> DbResult<()> {
    match command {
        Command::Query { sql, params } => {
            let mut session = MultiConnection::new(options)?;
            let table = session.get_data_table(&sql, &to_params(&params)).await?;
            info!(rows = table.len(), "Query finished");
            println!("{:#}", table.to_json());
            finish(session).await;
        }
        Command::Execute {
            sql,
            params,
            transaction,
        } => {
            let params = to_params(&params);
            if transaction {
                let mode = TransactionMode::Transaction(IsolationLevel::Serializable);
                let mut session = SingleConnection::open(options, mode).await?;
                match session.send_query(&sql, &params).await {
                    Ok(affected) => {
                        session.commit(false).await?;
                        println!("{}", affected);
                    }
                    Err(e) => {
                        session.rollback(false).await?;
                        session.close().await?;
                        return Err(e);
                    }
                }
                log_counters(session.session_id(), session.stats());
                session.close().await?;
            } else {
                let mut session = MultiConnection::new(options)?;
                let affected = session.send_query(&sql, &params).await?;
                println!("{}", affected);
                finish(session).await;
            }
        }
        Command::Scalar { sql, params } => {
            let mut session = MultiConnection::new(options)?;
            let value = session.get_object(&sql, &to_params(&params)).await?;
            println!("{}", value);
            finish(session).await;
        }
        Command::Columns { database, table } => {
            let session = MultiConnection::new(options)?;
            let (id, stats) = (session.session_id(), session.stats().clone());
            let catalog = ColumnCatalog::load(session).await?;
            let names = match (database, table) {
                (Some(db), Some(table)) => catalog.columns(&db, &table).await,
                (Some(db), None) => catalog.tables(&db).await,
                _ => catalog.databases().await,
            };
            for name in names {
                println!("{}", name);
            }
            log_counters(id, &stats);
        }
        Command::Watch {
            database,
            table,
            interval,
            count,
        } => {
            let session = MultiConnection::new(options)?;
            let (id, stats) = (session.session_id(), session.stats().clone());
            let watcher = TableUpdateTime::new(session);
            let mut checks = 0u32;
            loop {
                if watcher.has_changed(&database, &table, None).await? {
                    println!("{}.{} changed", database, table);
                }
                checks += 1;
                if count.is_some_and(|limit| checks >= limit) {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
            log_counters(id, &stats);
        }
        Command::ServerTime => {
            let session = MultiConnection::new(options)?;
            let (id, stats) = (session.session_id(), session.stats().clone());
            let clock = ServerClock::new(session);
            println!("{}", clock.now().await?.format("%Y-%m-%d %H:%M:%S"));
            log_counters(id, &stats);
        }
    }
    Ok(())
}

fn log_counters(session_id: u32, stats: &QueryStats) {
    debug!(
        session_id,
        queries = stats.queries(),
        updates = stats.updates(),
        "Session counters"
    );
}

async fn finish(session: MultiConnection) {
    log_counters(session.session_id(), session.stats());
    session.close().await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let options = config.connection_options()?;
    info!(server = %options, "Starting mysql-helper");

    if let Err(e) = run(options, config.command).await {
        error!(error = %e, suggestion = ?e.suggestion(), "Command failed");
        return Err(e.into());
    }

    Ok(())
}
