//! Error types for the MySQL helper.
//!
//! Every fallible operation returns [`DbResult`]. Driver errors are folded
//! into [`DbError`]; server errors keep the MySQL error number so callers can
//! react to deadlocks, duplicate keys and the like.

use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

/// MySQL server error numbers the helper reacts to.
pub mod codes {
    pub const ACCESS_DENIED: u16 = 1045;
    pub const UNKNOWN_DATABASE: u16 = 1049;
    pub const DUPLICATE_ENTRY: u16 = 1062;
    pub const PARSE_ERROR: u16 = 1064;
    pub const UNKNOWN_TABLE: u16 = 1146;
    pub const LOCK_WAIT_TIMEOUT: u16 = 1205;
    pub const DEADLOCK: u16 = 1213;
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("MySQL error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Database {
        message: String,
        /// Server error number, e.g. 1146 for an unknown table
        code: Option<u16>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Transaction error: {message} (session: {session_id})")]
    Transaction { message: String, session_id: u32 },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Conversion failed: {message}")]
    Conversion { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Server-side error. The suggestion is derived from the error number.
    pub fn database(message: impl Into<String>, code: Option<u16>) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: server_suggestion(code).to_string(),
        }
    }

    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    pub fn transaction(message: impl Into<String>, session_id: u32) -> Self {
        Self::Transaction {
            message: message.into(),
            session_id,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// A value could not be decoded or converted to the requested type.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// MySQL error number of a server error.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Self::Database { code, .. } => *code,
            _ => None,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Whether running the same work again may succeed: lost connections,
    /// timeouts, deadlocks and lock wait timeouts.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Database { code, .. } => {
                matches!(*code, Some(codes::DEADLOCK | codes::LOCK_WAIT_TIMEOUT))
            }
            _ => false,
        }
    }
}

fn server_suggestion(code: Option<u16>) -> &'static str {
    match code {
        Some(codes::ACCESS_DENIED) => "Check the user name, password and host grants",
        Some(codes::UNKNOWN_DATABASE) => "Check the database name in the connection options",
        Some(codes::DUPLICATE_ENTRY) => "Use on_duplicate_update or change the key value",
        Some(codes::PARSE_ERROR) => "Check the SQL syntax near the reported position",
        Some(codes::UNKNOWN_TABLE) => "Check the table name or create the table first",
        Some(codes::LOCK_WAIT_TIMEOUT) | Some(codes::DEADLOCK) => {
            "Roll back and run the transaction again"
        }
        _ => "Check the SQL statement and the referenced objects",
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection options and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(MySqlDatabaseError::number);
                DbError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::not_found("No rows returned"),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise max_connections or release sessions sooner",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Create a new session")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check that the MySQL server is running and reachable",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Build with tls-native or tls-rustls and check the server certificate",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check the server version and charset",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::invalid_input(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::conversion(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::conversion(format!("Decode error: {}", source)),
            other => DbError::internal(format!("Driver error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
