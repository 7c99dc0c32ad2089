// SQL Server backend over tiberius.
//
// - config: connection options and the connection factory
// - params: rendering a call as a DECLARE / EXEC / SELECT batch and binding inputs
// - query: draining result sets and converting column values
// - connection: the session, its cursor, and connect-time routing

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{MSSQL_DEPENDENCY_TYPE, MssqlConnectionFactory, MssqlOptions, MssqlOptionsBuilder};
pub use connection::{MssqlClient, MssqlConnection, MssqlCursor};
pub use params::{MssqlBatch, render_call};
