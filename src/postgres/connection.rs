use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, NoTls, RowStream};

use crate::command::ProcCommand;
use crate::connection::{NonQueryResult, OutputValues, ProcConnection, RowCursor};
use crate::error::SprocDbError;
use crate::results::{ColumnNames, ProcRow};

use super::params::{render_call, render_select};
use super::query::{extract_row, extract_value};

/// A Postgres session. Unopened until [`ProcConnection::open`] is called.
pub struct PostgresConnection {
    config: PgConfig,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("dbname", &self.config.get_dbname())
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl PostgresConnection {
    pub(crate) fn new(config: PgConfig) -> Self {
        Self {
            config,
            client: None,
            driver: None,
        }
    }

    fn client(&self) -> Result<&Client, SprocDbError> {
        self.client
            .as_ref()
            .ok_or_else(|| SprocDbError::ConnectionError("connection is not open".to_string()))
    }
}

#[async_trait]
impl ProcConnection for PostgresConnection {
    type Cursor = PostgresCursor;

    async fn open(&mut self) -> Result<(), SprocDbError> {
        if self.client.is_some() {
            return Ok(());
        }
        let (client, connection) = self.config.connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection ended with error");
            }
        });
        self.client = Some(client);
        self.driver = Some(driver);
        Ok(())
    }

    async fn execute_non_query(
        &mut self,
        command: &ProcCommand,
    ) -> Result<NonQueryResult, SprocDbError> {
        let call = render_call(command);
        let client = self.client()?;
        if !call.has_outputs() {
            let rows_affected = client.execute(call.text.as_str(), &call.bind_refs()).await?;
            return Ok(NonQueryResult {
                rows_affected,
                outputs: Vec::new(),
            });
        }

        let row = client.query_opt(call.text.as_str(), &call.bind_refs()).await?;
        let mut outputs = OutputValues::new();
        if let Some(row) = row {
            for (idx, column) in row.columns().iter().enumerate() {
                outputs.push((column.name().to_string(), extract_value(&row, idx)?));
            }
        }
        Ok(NonQueryResult {
            rows_affected: 0,
            outputs,
        })
    }

    async fn execute_reader(
        &mut self,
        command: &ProcCommand,
    ) -> Result<PostgresCursor, SprocDbError> {
        let call = render_select(command);
        let client = self.client()?;
        let statement = client.prepare(call.text.as_str()).await?;
        let columns = ColumnNames::new(
            statement
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
        );
        let stream = client.query_raw(&statement, call.binds.iter()).await?;
        Ok(PostgresCursor {
            columns,
            stream: Box::pin(stream),
        })
    }

    async fn close(&mut self) -> Result<(), SprocDbError> {
        // Dropping the client ends the session; the driver task then finishes.
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.await.map_err(|e| {
                SprocDbError::ConnectionError(format!("postgres connection task failed: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Streaming cursor over a Postgres result set.
pub struct PostgresCursor {
    columns: Arc<ColumnNames>,
    stream: Pin<Box<RowStream>>,
}

impl std::fmt::Debug for PostgresCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCursor")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn next_row(&mut self) -> Result<Option<ProcRow>, SprocDbError> {
        match self.stream.try_next().await? {
            Some(row) => Ok(Some(ProcRow::new(self.columns.clone(), extract_row(&row)?))),
            None => Ok(None),
        }
    }
}
