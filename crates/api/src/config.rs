//! Application configuration loaded from environment variables.

use std::str::FromStr;

use thiserror::Error;

/// Errors for environment values that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{name} is required when STORE_BACKEND={backend}")]
    Missing {
        name: &'static str,
        backend: &'static str,
    },
}

/// Which key-value store backs the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
    Dynamo,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Postgres => "postgres",
            StoreBackend::Dynamo => "dynamo",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" => Ok(StoreBackend::Postgres),
            "dynamo" | "dynamodb" => Ok(StoreBackend::Dynamo),
            _ => Err(ConfigError::InvalidValue {
                name: "STORE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `STORE_BACKEND`: `memory`, `postgres` or `dynamo` (default: `memory`)
/// - `DATABASE_URL`: required for `postgres`
/// - `DYNAMO_ENDPOINT_URL`: optional endpoint override for `dynamo`
/// - `APP_NAME` / `ENVIRONMENT`: table name prefix (default: `app` / `development`)
/// - `READ_MODELS`: comma-separated read model names to prepare tables for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub json_logs: bool,
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub dynamo_endpoint_url: Option<String>,
    pub app_name: String,
    pub environment: String,
    pub read_models: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: port,
            })?,
            None => defaults.port,
        };

        let json_logs = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let backend = match lookup("STORE_BACKEND") {
            Some(backend) => backend.parse()?,
            None => defaults.backend,
        };

        let database_url = lookup("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing {
                name: "DATABASE_URL",
                backend: backend.as_str(),
            });
        }

        let read_models = lookup("READ_MODELS")
            .map(|names| {
                names
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs,
            backend,
            database_url,
            dynamo_endpoint_url: lookup("DYNAMO_ENDPOINT_URL"),
            app_name: lookup("APP_NAME").unwrap_or(defaults.app_name),
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            read_models,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            json_logs: false,
            backend: StoreBackend::Memory,
            database_url: None,
            dynamo_endpoint_url: None,
            app_name: "app".to_string(),
            environment: "development".to_string(),
            read_models: Vec::new(),
        }
    }
}
