//! Result readers: run a built command on an already open connection and decode its rows.
//!
//! Each reader owns its cursor for the duration of the call, so the cursor is released on
//! every exit path, including a failing row mapper. One deadline, taken from the command
//! timeout, covers execution and every cursor advance.

use std::future::Future;

use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::command::ProcCommand;
use crate::connection::{OutputValues, ProcConnection, RowCursor};
use crate::error::SprocDbError;
use crate::executor::ExecutionState;
use crate::results::ProcRow;

/// Decoded value plus any output parameters the driver reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome<T> {
    pub value: T,
    pub outputs: OutputValues,
}

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    state: ExecutionState,
    fut: F,
) -> Result<T, SprocDbError>
where
    F: Future<Output = Result<T, SprocDbError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SprocDbError::Cancelled(state)),
        res = fut => res,
    }
}

async fn step<T, F>(
    cancel: &CancellationToken,
    deadline: Instant,
    command: &ProcCommand,
    fut: F,
) -> Result<T, SprocDbError>
where
    F: Future<Output = Result<T, SprocDbError>>,
{
    cancellable(cancel, ExecutionState::Executing, async {
        match timeout_at(deadline, fut).await {
            Ok(res) => res,
            Err(_elapsed) => Err(SprocDbError::timeout(command.name(), command.timeout())),
        }
    })
    .await
}

/// Execute a procedure that returns no rows. Rows affected is logged and dropped.
///
/// # Errors
/// Returns a database error on driver failure or timeout, `Cancelled` if `cancel` fires.
pub async fn read_none<C>(
    conn: &mut C,
    command: &ProcCommand,
    cancel: &CancellationToken,
) -> Result<ReadOutcome<()>, SprocDbError>
where
    C: ProcConnection,
{
    let deadline = Instant::now() + command.timeout();
    let result = step(cancel, deadline, command, conn.execute_non_query(command)).await?;
    tracing::debug!(
        procedure = command.name(),
        rows_affected = result.rows_affected,
        "non-query completed"
    );
    Ok(ReadOutcome {
        value: (),
        outputs: result.outputs,
    })
}

/// Execute a procedure and map its first row, if any.
///
/// Zero rows yields `None`; the mapper is never asked to invent a value.
///
/// # Errors
/// Returns a database error on driver failure or timeout, `Cancelled` if `cancel` fires,
/// and whatever the mapper returns, unmodified.
pub async fn read_scalar<C, T, M>(
    conn: &mut C,
    command: &ProcCommand,
    mut mapper: M,
    cancel: &CancellationToken,
) -> Result<ReadOutcome<Option<T>>, SprocDbError>
where
    C: ProcConnection,
    M: FnMut(&ProcRow) -> Result<T, SprocDbError>,
{
    let deadline = Instant::now() + command.timeout();
    let mut cursor = step(cancel, deadline, command, conn.execute_reader(command)).await?;
    let value = match step(cancel, deadline, command, cursor.next_row()).await? {
        Some(row) => Some(mapper(&row)?),
        None => None,
    };
    Ok(ReadOutcome {
        value,
        outputs: cursor.take_outputs(),
    })
}

/// Execute a procedure and map every row, in cursor order.
///
/// # Errors
/// Returns a database error on driver failure or timeout, `Cancelled` if `cancel` fires,
/// and the first mapper error, which stops reading.
pub async fn read_set<C, T, M>(
    conn: &mut C,
    command: &ProcCommand,
    mut mapper: M,
    cancel: &CancellationToken,
) -> Result<ReadOutcome<Vec<T>>, SprocDbError>
where
    C: ProcConnection,
    M: FnMut(&ProcRow) -> Result<T, SprocDbError>,
{
    let deadline = Instant::now() + command.timeout();
    let mut cursor = step(cancel, deadline, command, conn.execute_reader(command)).await?;
    let mut values = Vec::new();
    while let Some(row) = step(cancel, deadline, command, cursor.next_row()).await? {
        values.push(mapper(&row)?);
    }
    tracing::debug!(procedure = command.name(), rows = values.len(), "result set read");
    Ok(ReadOutcome {
        value: values,
        outputs: cursor.take_outputs(),
    })
}
