use std::env;
use std::time::Duration;

use dotenv::dotenv;
use serde::{Deserialize, Serialize};

/// PostgreSQL wire protocol limit on bound parameters per statement.
pub const DEFAULT_MAX_PARAMETERS: usize = 65535;

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    let connection = env::var("DATABASE_URL")?;
    Ok(connection)
}

/// How observed output values reach the records when no callback is given.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputMapping {
    /// Write every output column back through `Entity::apply`.
    #[default]
    ByName,

    /// Only report values in the result; records are changed by explicit callbacks only.
    CallbackOnly,
}

/// Tuning options for the bulk writer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BulkConfig {
    /// Upper bound on bound parameters in a single statement. Lower it for
    /// servers or poolers with a tighter limit than the wire protocol.
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,

    #[serde(default)]
    pub output_mapping: OutputMapping,

    /// Abandon the operation when a single statement runs longer than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_timeout_ms: Option<u64>,

    /// Log every generated statement at debug level.
    #[serde(default)]
    pub log_statements: bool,
}

fn default_max_parameters() -> usize {
    DEFAULT_MAX_PARAMETERS
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_parameters: DEFAULT_MAX_PARAMETERS,
            output_mapping: OutputMapping::default(),
            statement_timeout_ms: None,
            log_statements: false,
        }
    }
}

impl BulkConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    pub fn connection_string(&self) -> Result<String, env::VarError> {
        connection_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_simple() {
        let yaml = r#"
          max_parameters: 1000
          output_mapping: callback_only
          statement_timeout_ms: 2500
          log_statements: true
        "#;

        let config = BulkConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.max_parameters, 1000);
        assert_eq!(config.output_mapping, OutputMapping::CallbackOnly);
        assert_eq!(config.statement_timeout(), Some(Duration::from_millis(2500)));
        assert!(config.log_statements);
    }

    #[test]
    fn test_config_defaults() {
        let yaml = r#"
          log_statements: false
        "#;

        let config = BulkConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config, BulkConfig::default());
        assert_eq!(config.max_parameters, 65535);
        assert_eq!(config.output_mapping, OutputMapping::ByName);
        assert_eq!(config.statement_timeout(), None);
    }

    #[test]
    fn test_config_rejects_unknown_mapping() {
        let yaml = r#"
          output_mapping: positional
        "#;

        assert!(BulkConfig::from_yaml_str(yaml).is_err());
    }
}
