//! Capability traits the executor is generic over.
//!
//! A backend provides three pieces: a [`ConnectionFactory`] that hands out unopened
//! connections, the [`ProcConnection`] itself, and the [`RowCursor`] its reader returns.

use async_trait::async_trait;

use crate::command::ProcCommand;
use crate::error::SprocDbError;
use crate::results::ProcRow;
use crate::types::RowValues;

/// Output parameter values reported by a driver, by parameter name.
pub type OutputValues = Vec<(String, RowValues)>;

/// How a call consumes the procedure's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Rows are discarded; output parameters are read.
    NonQuery,
    /// The first result set is read through a cursor.
    Reader,
}

/// Creates unopened connections for one target database.
///
/// The factory also describes its target for telemetry, so a record can be produced even when
/// no connection could be created.
pub trait ConnectionFactory: Send + Sync {
    type Connection: ProcConnection;

    /// Dependency type reported in telemetry, e.g. `"SQL Server"`.
    fn dependency_type(&self) -> &str;

    /// Target identity reported in telemetry, `"server | database"`.
    fn target(&self) -> String;

    /// The statement text a connection sends for `command`.
    fn command_text(&self, command: &ProcCommand) -> String;

    /// Reject a call this backend cannot run, before any connection is made.
    ///
    /// # Errors
    /// Returns `SprocDbError::Unimplemented` if the backend has no way to run `command` as `kind`.
    fn check_call(&self, _command: &ProcCommand, _kind: CallKind) -> Result<(), SprocDbError> {
        Ok(())
    }

    /// Create a connection handle. Must not perform I/O; the executor opens it.
    ///
    /// # Errors
    /// Returns `SprocDbError::ConfigError` if the target configuration is unusable.
    fn create(&self) -> Result<Self::Connection, SprocDbError>;
}

/// Result of a non-query call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NonQueryResult {
    pub rows_affected: u64,
    pub outputs: OutputValues,
}

/// A single database connection able to run stored procedures.
#[async_trait]
pub trait ProcConnection: Send {
    type Cursor: RowCursor;

    /// # Errors
    /// Returns a database error if the connection cannot be established.
    async fn open(&mut self) -> Result<(), SprocDbError>;

    /// Execute the procedure without reading rows.
    ///
    /// # Errors
    /// Returns a database error if execution fails.
    async fn execute_non_query(
        &mut self,
        command: &ProcCommand,
    ) -> Result<NonQueryResult, SprocDbError>;

    /// Execute the procedure and return a forward-only cursor over its first result set.
    ///
    /// # Errors
    /// Returns a database error if execution fails.
    async fn execute_reader(&mut self, command: &ProcCommand)
    -> Result<Self::Cursor, SprocDbError>;

    /// Close the connection. Closing a connection that was never opened is a no-op.
    ///
    /// # Errors
    /// Returns a database error if the driver fails to shut the session down.
    async fn close(&mut self) -> Result<(), SprocDbError>;
}

/// Forward-only cursor over the rows of one result set. Dropping it releases it.
#[async_trait]
pub trait RowCursor: Send {
    /// Advance to the next row; `None` once the result set is exhausted.
    ///
    /// # Errors
    /// Returns a database error if the driver fails while reading.
    async fn next_row(&mut self) -> Result<Option<ProcRow>, SprocDbError>;

    /// Output parameter values, available once the rows have been consumed.
    fn take_outputs(&mut self) -> OutputValues {
        Vec::new()
    }
}
