//! Async stored-procedure execution with dependency telemetry.
//!
//! Every call made through a [`StoredProcedureExecutor`] opens a fresh connection, runs one
//! procedure in one of three shapes (no result, scalar, row set), releases the connection,
//! and reports exactly one [`DependencyTelemetry`] record to the configured sink.
//!
//! ```rust
//! use sproc_middleware::prelude::*;
//! use sproc_middleware::test_utils::{FakeConnectionFactory, FakeScript};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let factory = FakeConnectionFactory::new(FakeScript::rows(
//!     &["id", "name"],
//!     vec![vec![RowValues::Int(1), RowValues::Text("ada".into())]],
//! ));
//! let sink = CollectingTelemetrySink::new();
//! let executor = StoredProcedureExecutor::new(factory, sink.clone());
//!
//! let mut call = ProcedureCall::new("dbo.GetUsers").param(ProcParam::input("active", RowValues::Bool(true)));
//! let names = executor
//!     .execute_set(&mut call, |row| Ok(row.get_str("name")?.to_string()), &CancellationToken::new())
//!     .await?;
//! assert_eq!(names, vec!["ada".to_string()]);
//! assert_eq!(sink.len(), 1);
//! # Ok::<(), SprocDbError>(())
//! # }).unwrap();
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod reader;
pub mod results;
pub mod telemetry;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::SprocDbError;
pub use executor::{ExecutionState, StoredProcedureExecutor};
pub use telemetry::{DependencyTelemetry, TelemetrySink};
