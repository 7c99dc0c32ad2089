// Postgres backend over tokio-postgres.
//
// - config: the connection factory built from a tokio-postgres config or connection string
// - params: call rendering in named notation and ToSql for RowValues
// - query: column value extraction
// - connection: the session and its streaming cursor

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{POSTGRES_DEPENDENCY_TYPE, PostgresConnectionFactory};
pub use connection::{PostgresConnection, PostgresCursor};
pub use params::{PgCall, render_call, render_select};
pub use query::extract_value;
