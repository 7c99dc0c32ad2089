//! Dependency telemetry: one record per stored-procedure invocation, handed to a sink.
//!
//! Sinks are fire-and-forget. A failing sink is logged by the executor and never changes the
//! outcome of the database call.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Describes one outbound call to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyTelemetry {
    /// Kind of dependency, e.g. `"SQL Server"` or `"PostgreSQL"`.
    pub dependency_type: String,
    /// `"server | database"` identity of the connection.
    pub target: String,
    /// Stored procedure name.
    pub name: String,
    /// Statement text sent to the server, truncated.
    pub data: String,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    /// Driver error code when the call failed with a database error.
    pub result_code: Option<String>,
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry channel is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Receives dependency telemetry. Shared by concurrent invocations.
pub trait TelemetrySink: Send + Sync {
    /// # Errors
    /// Returns `TelemetryError` if the record could not be delivered.
    fn record(&self, telemetry: &DependencyTelemetry) -> Result<(), TelemetryError>;
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn record(&self, telemetry: &DependencyTelemetry) -> Result<(), TelemetryError> {
        (**self).record(telemetry)
    }
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, t: &DependencyTelemetry) -> Result<(), TelemetryError> {
        let duration_ms = t.duration.as_secs_f64() * 1000.0;
        let result_code = t.result_code.as_deref().unwrap_or("");
        if t.success {
            tracing::info!(
                db.system = %t.dependency_type,
                db.name = %t.target,
                db.operation = %t.name,
                db.statement = %t.data,
                start_time = %t.start_time.to_rfc3339(),
                duration_ms,
                otel.status_code = "OK",
                "dependency call succeeded"
            );
        } else {
            tracing::warn!(
                db.system = %t.dependency_type,
                db.name = %t.target,
                db.operation = %t.name,
                db.statement = %t.data,
                start_time = %t.start_time.to_rfc3339(),
                duration_ms,
                result_code,
                otel.status_code = "ERROR",
                "dependency call failed"
            );
        }
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _telemetry: &DependencyTelemetry) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectingTelemetrySink {
    records: Arc<Mutex<Vec<DependencyTelemetry>>>,
}

impl CollectingTelemetrySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DependencyTelemetry>> {
        match self.records.lock() {
            Ok(guard) => guard,
            // a panicking writer cannot leave a half-pushed record behind
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn records(&self) -> Vec<DependencyTelemetry> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain the buffer.
    #[must_use]
    pub fn take(&self) -> Vec<DependencyTelemetry> {
        std::mem::take(&mut *self.lock())
    }
}

impl TelemetrySink for CollectingTelemetrySink {
    fn record(&self, telemetry: &DependencyTelemetry) -> Result<(), TelemetryError> {
        self.lock().push(telemetry.clone());
        Ok(())
    }
}

/// Forwards records to an async consumer, e.g. an exporter task.
#[derive(Debug, Clone)]
pub struct ChannelTelemetrySink {
    tx: mpsc::UnboundedSender<DependencyTelemetry>,
}

impl ChannelTelemetrySink {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DependencyTelemetry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelTelemetrySink {
    fn record(&self, telemetry: &DependencyTelemetry) -> Result<(), TelemetryError> {
        self.tx
            .send(telemetry.clone())
            .map_err(|_| TelemetryError::Closed)
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesTelemetrySink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesTelemetrySink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> TelemetrySink for JsonLinesTelemetrySink<W> {
    fn record(&self, telemetry: &DependencyTelemetry) -> Result<(), TelemetryError> {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        serde_json::to_writer(&mut *writer, telemetry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub(crate) fn truncate_data(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
