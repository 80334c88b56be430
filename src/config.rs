use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::time::Duration;

use crate::database::dialect::CompatOptions;
use crate::database::dsn::{Dsn, TimeZone};
use crate::error::{Error, Result, ValidationErrors};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Full data source name, e.g. `user:pass@tcp(host:3306)/db?charset=utf8mb4`.
    /// Takes precedence over the discrete fields below when set.
    #[serde(default, skip_serializing)]
    pub dsn: Option<SecretString>,
    pub user: String,
    #[serde(skip_serializing, default = "empty_secret")]
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub charset: String,
    pub parse_time: bool,
    pub loc: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub close_timeout_seconds: u64,
    /// Extra attempts after the first failed connect (0 disables retrying)
    pub connect_retries: u32,
    pub retry_backoff_millis: u64,
    #[serde(default)]
    pub compat: CompatOptions,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            // e.g., LITTLEBLOG__DATABASE__DSN="blog:secret@tcp(db:3306)/little_blog"
            .add_source(
                config::Environment::with_prefix("LITTLEBLOG")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl DatabaseConfig {
    /// Resolves the data source this config points at.
    ///
    /// A configured `dsn` wins; otherwise the discrete fields are assembled.
    pub fn dsn(&self) -> Result<Dsn> {
        if let Some(raw) = &self.dsn {
            return Dsn::parse(raw.expose_secret());
        }

        Ok(Dsn {
            user: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            charset: self.charset.clone(),
            parse_time: self.parse_time,
            loc: TimeZone::from_param(&self.loc),
        })
    }

    /// Rejects pool settings that could never produce a working connection.
    pub fn validate(&self) -> Result<()> {
        let mut fields = HashMap::new();
        if self.max_connections == 0 {
            fields.insert("max_connections".to_string(), "must be greater than zero".to_string());
        }
        if self.connect_timeout_seconds == 0 {
            fields.insert(
                "connect_timeout_seconds".to_string(),
                "must be greater than zero".to_string(),
            );
        }
        if self.dsn.is_none() && self.host.trim().is_empty() {
            fields.insert("host".to_string(), "is required when no dsn is set".to_string());
        }
        if self.dsn.is_none() && self.database.trim().is_empty() {
            fields.insert("database".to_string(), "is required when no dsn is set".to_string());
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(ValidationErrors::Multiple { fields }))
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }
}

// Default values for the database configuration. No usable credentials live here;
// deployments provide them through LITTLEBLOG__DATABASE__* or a .env file.
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            user: "blog".to_string(),
            password: empty_secret(),
            host: "localhost".to_string(),
            port: 3306,
            database: "little_blog".to_string(),
            charset: "utf8mb4".to_string(),
            parse_time: true,
            loc: "Local".to_string(),
            max_connections: 10,
            connect_timeout_seconds: 10,
            close_timeout_seconds: 30,
            connect_retries: 0,
            retry_backoff_millis: 500,
            compat: CompatOptions::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "littleblog=info,sqlx=warn".to_string(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets are skipped by their serde attributes
        match serde_json::to_string_pretty(&self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "Error serializing config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_assembles_dsn_from_parts() {
        let config = DatabaseConfig::default();
        let dsn = config.dsn().unwrap();

        assert_eq!(dsn.user, "blog");
        assert_eq!(dsn.host, "localhost");
        assert_eq!(dsn.port, 3306);
        assert_eq!(dsn.database, "little_blog");
        assert_eq!(dsn.charset, "utf8mb4");
        assert_eq!(dsn.loc, TimeZone::Local);
    }

    #[test]
    fn test_configured_dsn_takes_precedence() {
        let config = DatabaseConfig {
            dsn: Some(SecretString::from("u:p@tcp(db.internal:3307)/blog".to_string())),
            ..DatabaseConfig::default()
        };
        let dsn = config.dsn().unwrap();

        assert_eq!(dsn.host, "db.internal");
        assert_eq!(dsn.port, 3307);
        assert_eq!(dsn.database, "blog");
        assert_eq!(dsn.password.expose_secret(), "p");
    }

    #[test]
    fn test_validate_reports_every_bad_field() {
        let config = DatabaseConfig {
            max_connections: 0,
            connect_timeout_seconds: 0,
            host: " ".to_string(),
            ..DatabaseConfig::default()
        };

        match config.validate() {
            Err(Error::Validation(ValidationErrors::Multiple { fields })) => {
                assert_eq!(fields.len(), 3);
                assert!(fields.contains_key("max_connections"));
                assert!(fields.contains_key("connect_timeout_seconds"));
                assert!(fields.contains_key("host"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        assert!(DatabaseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_display_never_prints_secrets() {
        let mut config = Config::default();
        config.database.password = SecretString::from("hunter2".to_string());
        config.database.dsn = Some(SecretString::from("u:hunter2@tcp(h:1)/d".to_string()));

        let rendered = config.to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("\"host\": \"localhost\""));
    }
}
