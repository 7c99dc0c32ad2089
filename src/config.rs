use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SprocDbError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_DATA_LENGTH: usize = 1000;

/// Settings shared by every call made through one executor.
///
/// ```rust
/// use sproc_middleware::prelude::*;
///
/// let cfg = ExecutorConfig::from_json_str(r#"{ "default_timeout_secs": 10 }"#).unwrap();
/// assert_eq!(cfg.default_timeout(), std::time::Duration::from_secs(10));
/// assert_eq!(cfg.max_data_length, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Command timeout applied when a call does not set its own.
    pub default_timeout_secs: u64,
    /// Overrides the dependency type the driver reports in telemetry.
    pub dependency_type: Option<String>,
    /// Maximum characters of statement text copied into telemetry.
    pub max_data_length: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            dependency_type: None,
            max_data_length: DEFAULT_MAX_DATA_LENGTH,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sub-second remainders round up to the next whole second.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs();
        self.default_timeout_secs = if timeout.subsec_nanos() > 0 { secs + 1 } else { secs };
        self
    }

    #[must_use]
    pub fn with_dependency_type(mut self, dependency_type: impl Into<String>) -> Self {
        self.dependency_type = Some(dependency_type.into());
        self
    }

    #[must_use]
    pub fn with_max_data_length(mut self, max_data_length: usize) -> Self {
        self.max_data_length = max_data_length;
        self
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Parse a JSON configuration document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `SprocDbError::ConfigError` if the document is malformed or the timeout is zero.
    pub fn from_json_str(json: &str) -> Result<Self, SprocDbError> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| SprocDbError::ConfigError(format!("invalid executor config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns `SprocDbError::ConfigError` if the default timeout is zero.
    pub fn validate(&self) -> Result<(), SprocDbError> {
        if self.default_timeout_secs == 0 {
            return Err(SprocDbError::ConfigError(
                "default_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
