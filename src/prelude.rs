//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use tokio_util::sync::CancellationToken;

pub use crate::command::ProcCommand;
pub use crate::config::ExecutorConfig;
pub use crate::connection::{
    CallKind, ConnectionFactory, NonQueryResult, OutputValues, ProcConnection, RowCursor,
};
pub use crate::error::{SprocDbError, TIMEOUT_RESULT_CODE};
pub use crate::executor::{ExecutionState, StoredProcedureExecutor};
pub use crate::reader::ReadOutcome;
pub use crate::results::{ColumnIndex, ColumnNames, ProcRow};
pub use crate::telemetry::{
    ChannelTelemetrySink, CollectingTelemetrySink, DependencyTelemetry, JsonLinesTelemetrySink,
    NoopTelemetrySink, TelemetryError, TelemetrySink, TracingTelemetrySink,
};
pub use crate::types::{ParamDirection, ParamType, ProcParam, ProcedureCall, RowValues};

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlConnectionFactory, MssqlOptions, MssqlOptionsBuilder};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresConnectionFactory;
