//! The instrumented stored-procedure executor.
//!
//! Every invocation walks `Idle → Opening → Executing → Closing → {Succeeded, Failed}` on a
//! fresh connection and produces exactly one [`DependencyTelemetry`] record, emitted as the
//! last action on every exit path. Request validation happens before `Idle` is left, so an
//! invalid request produces no record.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::command::ProcCommand;
use crate::config::ExecutorConfig;
use crate::connection::{CallKind, ConnectionFactory, ProcConnection};
use crate::error::SprocDbError;
use crate::reader::{self, ReadOutcome, cancellable};
use crate::results::ProcRow;
use crate::telemetry::{DependencyTelemetry, TelemetrySink, truncate_data};
use crate::types::ProcedureCall;

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Idle,
    Opening,
    Executing,
    Closing,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Opening => "opening",
            ExecutionState::Executing => "executing",
            ExecutionState::Closing => "closing",
            ExecutionState::Succeeded => "succeeded",
            ExecutionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Owns the pending telemetry record of one invocation.
///
/// The record is emitted by [`TelemetryScope::finish`], or on drop if the invocation future
/// was dropped or a row mapper panicked.
struct TelemetryScope<'s, S: TelemetrySink> {
    sink: &'s S,
    pending: Option<DependencyTelemetry>,
    started: Instant,
    state: ExecutionState,
}

impl<'s, S: TelemetrySink> TelemetryScope<'s, S> {
    fn begin(sink: &'s S, dependency_type: String, target: String, name: String, data: String) -> Self {
        Self {
            sink,
            pending: Some(DependencyTelemetry {
                dependency_type,
                target,
                name,
                data,
                start_time: Utc::now(),
                duration: Duration::ZERO,
                result_code: None,
                success: false,
            }),
            started: Instant::now(),
            state: ExecutionState::Idle,
        }
    }

    fn enter(&mut self, state: ExecutionState) {
        tracing::debug!(from = %self.state, to = %state, "state transition");
        self.state = state;
    }

    fn finish(mut self, outcome: Result<(), &SprocDbError>) {
        match outcome {
            Ok(()) => {
                self.enter(ExecutionState::Succeeded);
                self.emit(None, true);
            }
            Err(err) => {
                self.enter(ExecutionState::Failed);
                self.emit(err.result_code(), false);
            }
        }
    }

    fn emit(&mut self, result_code: Option<String>, success: bool) {
        let Some(mut record) = self.pending.take() else {
            return;
        };
        record.duration = self.started.elapsed();
        record.result_code = result_code;
        record.success = success;
        if let Err(e) = self.sink.record(&record) {
            tracing::warn!(
                error = %e,
                procedure = %record.name,
                "failed to record dependency telemetry"
            );
        }
    }
}

impl<S: TelemetrySink> Drop for TelemetryScope<'_, S> {
    fn drop(&mut self) {
        if self.pending.is_some() {
            tracing::warn!(state = %self.state, "stored procedure call abandoned before completion");
            self.state = ExecutionState::Failed;
            self.emit(None, false);
        }
    }
}

/// Runs stored procedures on connections from `F` and reports each call to `S`.
///
/// ```rust
/// use sproc_middleware::prelude::*;
/// use sproc_middleware::test_utils::{FakeConnectionFactory, FakeScript};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), SprocDbError> {
/// let factory = FakeConnectionFactory::new(
///     FakeScript::rows(&["id", "name"], vec![
///         vec![RowValues::Int(1), RowValues::Text("ada".into())],
///         vec![RowValues::Int(2), RowValues::Text("grace".into())],
///     ]),
/// );
/// let sink = CollectingTelemetrySink::new();
/// let executor = StoredProcedureExecutor::new(factory, sink.clone());
///
/// let mut call = ProcedureCall::new("GetUsersPage")
///     .timeout_secs(10)
///     .param(ProcParam::input("offset", RowValues::Int(0)))
///     .param(ProcParam::input("pageSize", RowValues::Int(2)));
/// let names = executor
///     .execute_set(&mut call, |row| Ok(row.get_str("name")?.to_string()), &CancellationToken::new())
///     .await?;
///
/// assert_eq!(names, ["ada", "grace"]);
/// assert!(sink.records()[0].success);
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct StoredProcedureExecutor<F, S> {
    factory: F,
    sink: S,
    config: ExecutorConfig,
}

impl<F, S> StoredProcedureExecutor<F, S>
where
    F: ConnectionFactory,
    S: TelemetrySink,
{
    /// Executor with the default configuration (30 second command timeout).
    pub fn new(factory: F, sink: S) -> Self {
        Self {
            factory,
            sink,
            config: ExecutorConfig::default(),
        }
    }

    /// # Errors
    /// Returns `SprocDbError::ConfigError` if `config` is invalid.
    pub fn with_config(factory: F, sink: S, config: ExecutorConfig) -> Result<Self, SprocDbError> {
        config.validate()?;
        Ok(Self {
            factory,
            sink,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run a procedure that returns no rows.
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed request (no telemetry is recorded), a database error
    /// from the driver, or `Cancelled`.
    pub async fn execute_no_result(
        &self,
        call: &mut ProcedureCall,
        cancel: &CancellationToken,
    ) -> Result<(), SprocDbError> {
        self.run(call, CallKind::NonQuery, cancel, async |conn, command| {
            reader::read_none(conn, command, cancel).await
        })
        .await
    }

    /// Run a procedure and map its first row; `None` when it returns no rows.
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed request and `Unimplemented` for one the backend cannot
    /// read rows for (no telemetry is recorded in either case), a database error from the
    /// driver, `Cancelled`, or the mapper's own error.
    pub async fn execute_scalar<T, M>(
        &self,
        call: &mut ProcedureCall,
        mapper: M,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, SprocDbError>
    where
        M: FnMut(&ProcRow) -> Result<T, SprocDbError>,
    {
        self.run(call, CallKind::Reader, cancel, async |conn, command| {
            reader::read_scalar(conn, command, mapper, cancel).await
        })
        .await
    }

    /// Run a procedure and map every row it returns, in order.
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed request (no telemetry is recorded), a database error
    /// from the driver, `Cancelled`, or the first mapper error.
    pub async fn execute_set<T, M>(
        &self,
        call: &mut ProcedureCall,
        mapper: M,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, SprocDbError>
    where
        M: FnMut(&ProcRow) -> Result<T, SprocDbError>,
    {
        self.run(call, CallKind::Reader, cancel, async |conn, command| {
            reader::read_set(conn, command, mapper, cancel).await
        })
        .await
    }

    fn build_command(
        &self,
        call: &ProcedureCall,
        kind: CallKind,
    ) -> Result<ProcCommand, SprocDbError> {
        let timeout = call
            .get_timeout()
            .unwrap_or_else(|| self.config.default_timeout());
        let command = ProcCommand::build(call.name(), timeout, call.parameters())?;
        self.factory.check_call(&command, kind)?;
        Ok(command)
    }

    async fn run<T>(
        &self,
        call: &mut ProcedureCall,
        kind: CallKind,
        cancel: &CancellationToken,
        read: impl AsyncFnOnce(&mut F::Connection, &ProcCommand) -> Result<ReadOutcome<T>, SprocDbError>,
    ) -> Result<T, SprocDbError> {
        let command = self.build_command(call, kind)?;

        let dependency_type = self
            .config
            .dependency_type
            .clone()
            .unwrap_or_else(|| self.factory.dependency_type().to_string());
        let target = self.factory.target();
        let data = truncate_data(
            &self.factory.command_text(&command),
            self.config.max_data_length,
        );
        let span = tracing::debug_span!(
            "stored_procedure",
            procedure = command.name(),
            target = %target
        );

        async {
            let mut scope = TelemetryScope::begin(
                &self.sink,
                dependency_type,
                target,
                command.name().to_string(),
                data,
            );
            let outcome = self.drive(&mut scope, &command, cancel, read).await;
            match outcome {
                Ok(read) => {
                    call.apply_outputs(read.outputs);
                    scope.finish(Ok(()));
                    Ok(read.value)
                }
                Err(err) => {
                    scope.finish(Err(&err));
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive<T>(
        &self,
        scope: &mut TelemetryScope<'_, S>,
        command: &ProcCommand,
        cancel: &CancellationToken,
        read: impl AsyncFnOnce(&mut F::Connection, &ProcCommand) -> Result<ReadOutcome<T>, SprocDbError>,
    ) -> Result<ReadOutcome<T>, SprocDbError> {
        scope.enter(ExecutionState::Opening);
        let mut conn = self.factory.create()?;

        let result = match cancellable(cancel, ExecutionState::Opening, conn.open()).await {
            Ok(()) => {
                scope.enter(ExecutionState::Executing);
                read(&mut conn, command).await
            }
            Err(err) => Err(err),
        };

        scope.enter(ExecutionState::Closing);
        match result {
            Ok(outcome) => {
                cancellable(cancel, ExecutionState::Closing, conn.close()).await?;
                Ok(outcome)
            }
            Err(err) => {
                // the original error wins over anything close reports; close is polled first so
                // it is always attempted, and abandoned once it is pending on a cancelled token
                tokio::select! {
                    biased;
                    closed = tokio::time::timeout(command.timeout(), conn.close()) => match closed {
                        Ok(Ok(())) => {}
                        Ok(Err(close_err)) => {
                            tracing::warn!(error = %close_err, "closing connection after failure failed");
                        }
                        Err(_elapsed) => {
                            tracing::warn!("closing connection after failure timed out");
                        }
                    },
                    () = cancel.cancelled() => {
                        tracing::warn!("closing connection after failure abandoned on cancellation");
                    }
                }
                Err(err)
            }
        }
    }
}
