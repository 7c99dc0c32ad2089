//! Scripted in-memory backend for exercising the executor without a database server.
//!
//! A [`FakeScript`] describes what the "server" does; [`FakeStats`] counts what the executor
//! did to the connection and its cursors, so tests can assert that everything is released
//! exactly once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ProcCommand;
use crate::connection::{
    CallKind, ConnectionFactory, NonQueryResult, OutputValues, ProcConnection, RowCursor,
};
use crate::error::SprocDbError;
use crate::results::{ColumnNames, ProcRow};
use crate::types::RowValues;

#[derive(Debug, Clone, PartialEq)]
struct ScriptedFailure {
    code: String,
    message: String,
}

impl ScriptedFailure {
    fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    fn to_error(&self) -> SprocDbError {
        SprocDbError::database(self.code.clone(), self.message.clone())
    }
}

/// What the fake server does when a procedure is called.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    outputs: OutputValues,
    rows_affected: u64,
    fail_open: Option<ScriptedFailure>,
    fail_execute: Option<ScriptedFailure>,
    fail_on_row: Option<(usize, ScriptedFailure)>,
    fail_close: Option<ScriptedFailure>,
    open_delay: Option<Duration>,
    execute_delay: Option<Duration>,
    row_delay: Option<Duration>,
    close_delay: Option<Duration>,
    reader_outputs_unsupported: bool,
}

impl FakeScript {
    /// A procedure that succeeds and returns no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A procedure returning `rows` under the given column names.
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows_affected: rows.len() as u64,
            rows,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_output(mut self, name: &str, value: RowValues) -> Self {
        self.outputs.push((name.to_string(), value));
        self
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    #[must_use]
    pub fn fail_open(mut self, code: &str, message: &str) -> Self {
        self.fail_open = Some(ScriptedFailure::new(code, message));
        self
    }

    #[must_use]
    pub fn fail_execute(mut self, code: &str, message: &str) -> Self {
        self.fail_execute = Some(ScriptedFailure::new(code, message));
        self
    }

    /// Fail while advancing to the zero-based row `index`.
    #[must_use]
    pub fn fail_on_row(mut self, index: usize, code: &str, message: &str) -> Self {
        self.fail_on_row = Some((index, ScriptedFailure::new(code, message)));
        self
    }

    #[must_use]
    pub fn fail_close(mut self, code: &str, message: &str) -> Self {
        self.fail_close = Some(ScriptedFailure::new(code, message));
        self
    }

    #[must_use]
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }

    /// Delay closing a connection that was opened.
    #[must_use]
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    /// Refuse reader calls that declare output parameters, as Postgres does.
    #[must_use]
    pub fn without_reader_outputs(mut self) -> Self {
        self.reader_outputs_unsupported = true;
        self
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    created: AtomicUsize,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    cursors_opened: AtomicUsize,
    cursors_released: AtomicUsize,
    rows_read: AtomicUsize,
    last_command: Mutex<Option<ProcCommand>>,
}

/// Shared counters for every connection a [`FakeConnectionFactory`] hands out.
#[derive(Debug, Clone, Default)]
pub struct FakeStats {
    inner: Arc<StatsInner>,
}

impl FakeStats {
    #[must_use]
    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.inner.open_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cursors_opened(&self) -> usize {
        self.inner.cursors_opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cursors_released(&self) -> usize {
        self.inner.cursors_released.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rows_read(&self) -> usize {
        self.inner.rows_read.load(Ordering::SeqCst)
    }

    /// The last command a connection was asked to execute.
    #[must_use]
    pub fn last_command(&self) -> Option<ProcCommand> {
        match self.inner.last_command.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_last_command(&self, command: &ProcCommand) {
        let mut guard = match self.inner.last_command.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(command.clone());
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`FakeConnection`]s that all follow the same script.
#[derive(Debug, Clone)]
pub struct FakeConnectionFactory {
    script: FakeScript,
    stats: FakeStats,
    target: String,
}

impl FakeConnectionFactory {
    #[must_use]
    pub fn new(script: FakeScript) -> Self {
        Self {
            script,
            stats: FakeStats::default(),
            target: "fake-server | fake-db".to_string(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &FakeStats {
        &self.stats
    }
}

impl ConnectionFactory for FakeConnectionFactory {
    type Connection = FakeConnection;

    fn dependency_type(&self) -> &str {
        "Fake"
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    fn command_text(&self, command: &ProcCommand) -> String {
        let args: Vec<String> = command
            .params()
            .iter()
            .map(|p| format!("@{}", p.name()))
            .collect();
        format!("EXEC {} {}", command.name(), args.join(", "))
            .trim_end()
            .to_string()
    }

    fn check_call(&self, command: &ProcCommand, kind: CallKind) -> Result<(), SprocDbError> {
        if self.script.reader_outputs_unsupported && kind == CallKind::Reader && command.has_outputs()
        {
            return Err(SprocDbError::Unimplemented(format!(
                "{} cannot return output parameters from a reader",
                command.name()
            )));
        }
        Ok(())
    }

    fn create(&self) -> Result<FakeConnection, SprocDbError> {
        FakeStats::bump(&self.stats.inner.created);
        Ok(FakeConnection {
            script: self.script.clone(),
            stats: self.stats.clone(),
            open: false,
        })
    }
}

/// A connection to the fake server.
#[derive(Debug)]
pub struct FakeConnection {
    script: FakeScript,
    stats: FakeStats,
    open: bool,
}

impl FakeConnection {
    fn ensure_open(&self) -> Result<(), SprocDbError> {
        if self.open {
            Ok(())
        } else {
            Err(SprocDbError::ConnectionError(
                "connection is not open".to_string(),
            ))
        }
    }

    async fn begin_execute(&self, command: &ProcCommand) -> Result<(), SprocDbError> {
        self.ensure_open()?;
        self.stats.set_last_command(command);
        if let Some(delay) = self.script.execute_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.fail_execute {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProcConnection for FakeConnection {
    type Cursor = FakeCursor;

    async fn open(&mut self) -> Result<(), SprocDbError> {
        FakeStats::bump(&self.stats.inner.open_calls);
        if let Some(delay) = self.script.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.script.fail_open {
            return Err(failure.to_error());
        }
        self.open = true;
        Ok(())
    }

    async fn execute_non_query(
        &mut self,
        command: &ProcCommand,
    ) -> Result<NonQueryResult, SprocDbError> {
        self.begin_execute(command).await?;
        Ok(NonQueryResult {
            rows_affected: self.script.rows_affected,
            outputs: self.script.outputs.clone(),
        })
    }

    async fn execute_reader(&mut self, command: &ProcCommand) -> Result<FakeCursor, SprocDbError> {
        self.begin_execute(command).await?;
        FakeStats::bump(&self.stats.inner.cursors_opened);
        let columns = ColumnNames::new(self.script.columns.clone());
        let rows = self
            .script
            .rows
            .iter()
            .map(|values| ProcRow::new(columns.clone(), values.clone()))
            .collect();
        Ok(FakeCursor {
            rows,
            position: 0,
            fail_on_row: self.script.fail_on_row.clone(),
            row_delay: self.script.row_delay,
            outputs: self.script.outputs.clone(),
            stats: self.stats.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), SprocDbError> {
        FakeStats::bump(&self.stats.inner.close_calls);
        let was_open = std::mem::replace(&mut self.open, false);
        if !was_open {
            return Ok(());
        }
        if let Some(delay) = self.script.close_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.fail_close {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

/// Cursor over scripted rows. Counts its own release.
#[derive(Debug)]
pub struct FakeCursor {
    rows: VecDeque<ProcRow>,
    position: usize,
    fail_on_row: Option<(usize, ScriptedFailure)>,
    row_delay: Option<Duration>,
    outputs: OutputValues,
    stats: FakeStats,
}

#[async_trait]
impl RowCursor for FakeCursor {
    async fn next_row(&mut self) -> Result<Option<ProcRow>, SprocDbError> {
        if let Some(delay) = self.row_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((index, failure)) = &self.fail_on_row {
            if *index == self.position {
                return Err(failure.to_error());
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.position += 1;
            FakeStats::bump(&self.stats.inner.rows_read);
        }
        Ok(row)
    }

    fn take_outputs(&mut self) -> OutputValues {
        std::mem::take(&mut self.outputs)
    }
}

impl Drop for FakeCursor {
    fn drop(&mut self) {
        FakeStats::bump(&self.stats.inner.cursors_released);
    }
}
