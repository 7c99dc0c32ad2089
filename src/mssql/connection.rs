use std::collections::VecDeque;

use async_trait::async_trait;
use tiberius::{Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::command::ProcCommand;
use crate::connection::{NonQueryResult, OutputValues, ProcConnection, RowCursor};
use crate::error::SprocDbError;
use crate::results::ProcRow;

use super::params::{MssqlBatch, render_call};
use super::query::{MssqlResultSet, collect_result_sets};

/// Type alias for the tiberius client over a tokio TCP stream.
pub type MssqlClient = Client<Compat<TcpStream>>;

/// A SQL Server session. Unopened until [`ProcConnection::open`] is called.
pub struct MssqlConnection {
    config: Config,
    named_instance: bool,
    client: Option<MssqlClient>,
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("addr", &self.config.get_addr())
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl MssqlConnection {
    pub(crate) fn new(config: Config, named_instance: bool) -> Self {
        Self {
            config,
            named_instance,
            client: None,
        }
    }

    fn client(&mut self) -> Result<&mut MssqlClient, SprocDbError> {
        self.client
            .as_mut()
            .ok_or_else(|| SprocDbError::ConnectionError("connection is not open".to_string()))
    }

    async fn run_batch(&mut self, batch: &MssqlBatch) -> Result<Vec<MssqlResultSet>, SprocDbError> {
        let client = self.client()?;
        let stream = batch.to_query().query(client).await?;
        collect_result_sets(stream).await
    }
}

async fn tcp_connect(config: &Config, named_instance: bool) -> Result<TcpStream, SprocDbError> {
    let tcp = if named_instance {
        TcpStream::connect_named(config).await?
    } else {
        TcpStream::connect(config.get_addr()).await.map_err(|e| {
            SprocDbError::ConnectionError(format!("TCP connection error: {e}"))
        })?
    };
    tcp.set_nodelay(true)
        .map_err(|e| SprocDbError::ConnectionError(format!("TCP configuration error: {e}")))?;
    Ok(tcp)
}

async fn connect(mut config: Config, named_instance: bool) -> Result<MssqlClient, SprocDbError> {
    let tcp = tcp_connect(&config, named_instance).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL may redirect the login to another node.
        Err(tiberius::error::Error::Routing { host, port }) => {
            config.host(&host);
            config.port(port);
            let tcp = tcp_connect(&config, false).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Split the batch's result sets into the procedure's first set and the trailing output row.
fn split_outputs(
    mut sets: Vec<MssqlResultSet>,
    batch: &MssqlBatch,
) -> (Option<MssqlResultSet>, OutputValues) {
    let outputs = if batch.has_outputs() {
        sets.pop()
            .and_then(|set| set.rows.into_iter().next())
            .map(|row| {
                batch
                    .output_names
                    .iter()
                    .cloned()
                    .zip(row.into_values())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    (sets.into_iter().next(), outputs)
}

#[async_trait]
impl ProcConnection for MssqlConnection {
    type Cursor = MssqlCursor;

    async fn open(&mut self) -> Result<(), SprocDbError> {
        if self.client.is_none() {
            let client = connect(self.config.clone(), self.named_instance).await?;
            self.client = Some(client);
        }
        Ok(())
    }

    async fn execute_non_query(
        &mut self,
        command: &ProcCommand,
    ) -> Result<NonQueryResult, SprocDbError> {
        let batch = render_call(command);
        if batch.has_outputs() {
            let sets = self.run_batch(&batch).await?;
            let (_, outputs) = split_outputs(sets, &batch);
            return Ok(NonQueryResult {
                rows_affected: 0,
                outputs,
            });
        }
        let client = self.client()?;
        let result = batch.to_query().execute(client).await?;
        Ok(NonQueryResult {
            rows_affected: result.total(),
            outputs: Vec::new(),
        })
    }

    async fn execute_reader(&mut self, command: &ProcCommand) -> Result<MssqlCursor, SprocDbError> {
        let batch = render_call(command);
        let sets = self.run_batch(&batch).await?;
        let (first, outputs) = split_outputs(sets, &batch);
        Ok(MssqlCursor {
            rows: first.map(|set| set.rows.into()).unwrap_or_default(),
            outputs,
        })
    }

    async fn close(&mut self) -> Result<(), SprocDbError> {
        match self.client.take() {
            Some(client) => Ok(client.close().await?),
            None => Ok(()),
        }
    }
}

/// Cursor over a buffered SQL Server result set.
///
/// tiberius streams borrow the client, so the batch is drained when it is executed and the
/// cursor hands the rows out in order.
#[derive(Debug, Default)]
pub struct MssqlCursor {
    rows: VecDeque<ProcRow>,
    outputs: OutputValues,
}

#[async_trait]
impl RowCursor for MssqlCursor {
    async fn next_row(&mut self) -> Result<Option<ProcRow>, SprocDbError> {
        Ok(self.rows.pop_front())
    }

    fn take_outputs(&mut self) -> OutputValues {
        std::mem::take(&mut self.outputs)
    }
}
