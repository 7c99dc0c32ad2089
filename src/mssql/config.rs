use tiberius::{AuthMethod, Config as TiberiusConfig};

use crate::command::ProcCommand;
use crate::connection::ConnectionFactory;
use crate::error::SprocDbError;

use super::connection::MssqlConnection;
use super::params::render_call;

/// Dependency type SQL Server calls are reported under.
pub const MSSQL_DEPENDENCY_TYPE: &str = "SQL Server";

/// Options for connecting to SQL Server.
#[derive(Debug, Clone)]
pub struct MssqlOptions {
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub trust_cert: bool,
    pub application_name: Option<String>,
}

impl MssqlOptions {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            server,
            database,
            user,
            password,
            port: None,
            instance_name: None,
            trust_cert: false,
            application_name: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    /// Accept the server certificate without validation. Development servers only.
    #[must_use]
    pub fn with_trust_cert(mut self, trust_cert: bool) -> Self {
        self.trust_cert = trust_cert;
        self
    }

    #[must_use]
    pub fn with_application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = Some(application_name.into());
        self
    }

    /// `"server | database"`, as reported in telemetry.
    #[must_use]
    pub fn target(&self) -> String {
        match &self.instance_name {
            Some(instance) => format!("{}\\{instance} | {}", self.server, self.database),
            None => format!("{} | {}", self.server, self.database),
        }
    }
}

/// Fluent builder for MSSQL options.
#[derive(Debug, Clone)]
pub struct MssqlOptionsBuilder {
    opts: MssqlOptions,
}

impl MssqlOptionsBuilder {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            opts: MssqlOptions::new(server, database, user, password),
        }
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: Option<String>) -> Self {
        self.opts.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn trust_cert(mut self, trust_cert: bool) -> Self {
        self.opts.trust_cert = trust_cert;
        self
    }

    #[must_use]
    pub fn application_name(mut self, application_name: impl Into<String>) -> Self {
        self.opts.application_name = Some(application_name.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> MssqlOptions {
        self.opts
    }

    /// Build a connection factory for SQL Server.
    ///
    /// # Errors
    ///
    /// Returns `SprocDbError::ConfigError` if required options are missing.
    pub fn build(self) -> Result<MssqlConnectionFactory, SprocDbError> {
        MssqlConnectionFactory::new(self.finish())
    }
}

/// Hands out unopened SQL Server connections for one server and database.
#[derive(Debug, Clone)]
pub struct MssqlConnectionFactory {
    options: MssqlOptions,
}

impl MssqlConnectionFactory {
    /// # Errors
    /// Returns `SprocDbError::ConfigError` if the server, database or user is empty.
    pub fn new(options: MssqlOptions) -> Result<Self, SprocDbError> {
        if options.server.trim().is_empty() {
            return Err(SprocDbError::ConfigError("server is required".to_string()));
        }
        if options.database.trim().is_empty() {
            return Err(SprocDbError::ConfigError("database is required".to_string()));
        }
        if options.user.trim().is_empty() {
            return Err(SprocDbError::ConfigError("user is required".to_string()));
        }
        Ok(Self { options })
    }

    #[must_use]
    pub fn builder(
        server: String,
        database: String,
        user: String,
        password: String,
    ) -> MssqlOptionsBuilder {
        MssqlOptionsBuilder::new(server, database, user, password)
    }

    #[must_use]
    pub fn options(&self) -> &MssqlOptions {
        &self.options
    }
}

impl ConnectionFactory for MssqlConnectionFactory {
    type Connection = MssqlConnection;

    fn dependency_type(&self) -> &str {
        MSSQL_DEPENDENCY_TYPE
    }

    fn target(&self) -> String {
        self.options.target()
    }

    fn command_text(&self, command: &ProcCommand) -> String {
        render_call(command).text
    }

    fn create(&self) -> Result<MssqlConnection, SprocDbError> {
        Ok(MssqlConnection::new(
            build_tiberius_config(&self.options),
            self.options.instance_name.is_some(),
        ))
    }
}

pub(crate) fn build_tiberius_config(opts: &MssqlOptions) -> TiberiusConfig {
    let mut config = TiberiusConfig::new();
    config.host(&opts.server);
    config.database(&opts.database);
    config.port(opts.port.unwrap_or(1433));
    config.authentication(AuthMethod::sql_server(&opts.user, &opts.password));
    if let Some(instance) = &opts.instance_name {
        config.instance_name(instance);
    }
    if let Some(app) = &opts.application_name {
        config.application_name(app);
    }
    if opts.trust_cert {
        config.trust_cert();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_server_and_database() {
        let opts = MssqlOptions::new("db01".into(), "sales".into(), "app".into(), "pw".into());
        assert_eq!(opts.target(), "db01 | sales");
        let named = opts.with_instance_name(Some("SQLEXPRESS".into()));
        assert_eq!(named.target(), "db01\\SQLEXPRESS | sales");
    }

    #[test]
    fn builder_requires_server_database_and_user() {
        let err = MssqlConnectionFactory::builder(String::new(), "d".into(), "u".into(), "p".into())
            .build()
            .unwrap_err();
        assert!(matches!(err, SprocDbError::ConfigError(_)));

        let factory =
            MssqlConnectionFactory::builder("db01".into(), "sales".into(), "u".into(), "p".into())
                .port(Some(14330))
                .trust_cert(true)
                .build()
                .unwrap();
        assert_eq!(factory.dependency_type(), MSSQL_DEPENDENCY_TYPE);
        assert_eq!(factory.options().port, Some(14330));
        assert!(factory.create().is_ok());
    }
}
