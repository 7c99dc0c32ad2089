use std::str::FromStr;

use tokio_postgres::Config as PgConfig;
use tokio_postgres::config::Host;

use crate::command::ProcCommand;
use crate::connection::{CallKind, ConnectionFactory};
use crate::error::SprocDbError;

use super::connection::PostgresConnection;
use super::params::render_call;

/// Dependency type Postgres calls are reported under.
pub const POSTGRES_DEPENDENCY_TYPE: &str = "PostgreSQL";

/// Hands out unopened Postgres connections for one server and database.
#[derive(Debug, Clone)]
pub struct PostgresConnectionFactory {
    config: PgConfig,
}

impl PostgresConnectionFactory {
    /// Wrap a tokio-postgres config.
    ///
    /// # Errors
    /// Returns `SprocDbError::ConfigError` if the database name, host, or user is missing.
    pub fn new(config: PgConfig) -> Result<Self, SprocDbError> {
        if config.get_dbname().is_none() {
            return Err(SprocDbError::ConfigError("dbname is required".to_string()));
        }
        if config.get_hosts().is_empty() {
            return Err(SprocDbError::ConfigError("host is required".to_string()));
        }
        if config.get_user().is_none() {
            return Err(SprocDbError::ConfigError("user is required".to_string()));
        }
        Ok(Self { config })
    }

    /// Parse a key/value or URL connection string, e.g.
    /// `host=localhost user=app dbname=sales` or `postgresql://app@localhost/sales`.
    ///
    /// # Errors
    /// Returns `SprocDbError::ConfigError` if the string does not parse or lacks required fields.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, SprocDbError> {
        let config = PgConfig::from_str(conn_str)
            .map_err(|e| SprocDbError::ConfigError(format!("invalid connection string: {e}")))?;
        Self::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &PgConfig {
        &self.config
    }
}

impl ConnectionFactory for PostgresConnectionFactory {
    type Connection = PostgresConnection;

    fn dependency_type(&self) -> &str {
        POSTGRES_DEPENDENCY_TYPE
    }

    fn target(&self) -> String {
        let hosts: Vec<String> = self
            .config
            .get_hosts()
            .iter()
            .map(|host| match host {
                Host::Tcp(name) => name.clone(),
                #[cfg(unix)]
                Host::Unix(path) => path.display().to_string(),
            })
            .collect();
        format!(
            "{} | {}",
            hosts.join(","),
            self.config.get_dbname().unwrap_or_default()
        )
    }

    fn command_text(&self, command: &ProcCommand) -> String {
        render_call(command).text
    }

    fn check_call(&self, command: &ProcCommand, kind: CallKind) -> Result<(), SprocDbError> {
        if kind == CallKind::Reader && command.has_outputs() {
            return Err(SprocDbError::Unimplemented(format!(
                "{} declares output parameters; Postgres returns them only from a no-result call",
                command.name()
            )));
        }
        Ok(())
    }

    fn create(&self) -> Result<PostgresConnection, SprocDbError> {
        Ok(PostgresConnection::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::{ParamType, ProcParam, RowValues};

    #[test]
    fn parses_connection_string_and_reports_target() {
        let factory = PostgresConnectionFactory::from_connection_string(
            "host=db01 port=5432 user=app password=pw dbname=sales",
        )
        .unwrap();
        assert_eq!(factory.target(), "db01 | sales");
        assert_eq!(factory.dependency_type(), POSTGRES_DEPENDENCY_TYPE);
        assert!(factory.create().is_ok());
    }

    #[test]
    fn missing_fields_are_config_errors() {
        let err =
            PostgresConnectionFactory::from_connection_string("host=db01 user=app").unwrap_err();
        assert!(matches!(err, SprocDbError::ConfigError(ref m) if m.contains("dbname")));

        let err = PostgresConnectionFactory::from_connection_string("host=db01 frobnicate=1")
            .unwrap_err();
        assert!(matches!(err, SprocDbError::ConfigError(_)));
    }

    #[test]
    fn reader_calls_with_outputs_are_rejected_up_front() {
        let factory =
            PostgresConnectionFactory::from_connection_string("host=db01 user=app dbname=sales")
                .unwrap();
        let params = [
            ProcParam::input("p_min", RowValues::Int(1)),
            ProcParam::output("p_total", ParamType::Int),
        ];
        let command = ProcCommand::build("count_users", Duration::from_secs(5), &params).unwrap();

        assert!(factory.check_call(&command, CallKind::NonQuery).is_ok());
        let err = factory.check_call(&command, CallKind::Reader).unwrap_err();
        assert!(matches!(err, SprocDbError::Unimplemented(ref m) if m.contains("count_users")));

        let plain = ProcCommand::build("users_page", Duration::from_secs(5), &params[..1]).unwrap();
        assert!(factory.check_call(&plain, CallKind::Reader).is_ok());
    }
}
