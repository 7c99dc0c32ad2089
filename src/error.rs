use thiserror::Error;

use crate::executor::ExecutionState;

/// Result code recorded when the command deadline expires before the driver answers.
pub const TIMEOUT_RESULT_CODE: &str = "timeout";

#[derive(Debug, Error)]
pub enum SprocDbError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    /// Driver-neutral database failure carrying the code the backend reported.
    #[error("Database error {code}: {message}")]
    DatabaseError { code: String, message: String },

    #[error("Row mapping error: {0}")]
    MappingError(String),

    #[error("Operation cancelled while {0}")]
    Cancelled(ExecutionState),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl SprocDbError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::MappingError(msg.into())
    }

    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseError {
            code: code.into(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout(name: &str, timeout: std::time::Duration) -> Self {
        Self::database(
            TIMEOUT_RESULT_CODE,
            format!(
                "stored procedure {name} did not complete within {}s",
                timeout.as_secs()
            ),
        )
    }

    /// True for failures reported by the database or its driver (open, execute, read, close).
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::PostgresError(_) => true,
            #[cfg(feature = "mssql")]
            Self::MssqlError(_) => true,
            Self::DatabaseError { .. } | Self::ConnectionError(_) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The driver-specific error code, stringified, for dependency telemetry.
    ///
    /// `None` for anything that is not a database error. Postgres reports its SQLSTATE,
    /// SQL Server its error number.
    #[must_use]
    pub fn result_code(&self) -> Option<String> {
        match self {
            #[cfg(feature = "postgres")]
            Self::PostgresError(e) => Some(
                e.code()
                    .map_or_else(|| "connection".to_string(), |state| state.code().to_string()),
            ),
            #[cfg(feature = "mssql")]
            Self::MssqlError(e) => Some(match e {
                tiberius::error::Error::Server(token) => token.code().to_string(),
                tiberius::error::Error::Io { .. } => "io".to_string(),
                _ => "driver".to_string(),
            }),
            Self::DatabaseError { code, .. } => Some(code.clone()),
            Self::ConnectionError(_) => Some("connection".to_string()),
            _ => None,
        }
    }
}
