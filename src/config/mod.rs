//! Configuration loading for the Sungrow telemetry API.
//!
//! Loads layered `.env` files and process environment variables into a
//! typed [`AppConfig`]. Required values (database, cache, device tokens)
//! fail fast with a descriptive error before any network I/O.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Application configuration derived from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub profile: String,
    pub api_bind_addr: String,
    pub log_level: String,
    pub log_format: String,
    pub database_url: String,
    pub redis_url: String,
    /// Raw `token:device_id,...` string; parsed by the auth layer.
    #[serde(skip_serializing)]
    pub device_tokens: String,
    pub cache_ttl_s: u64,
    pub max_samples_per_request: usize,
    pub max_request_bytes: usize,
    pub db_max_connections: u32,
    pub db_acquire_timeout_ms: u64,
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (device tokens omitted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: "postgresql://localhost:5432/sungrow".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            device_tokens: "test-token:test-device".to_string(),
            cache_ttl_s: default_cache_ttl_s(),
            max_samples_per_request: default_max_samples_per_request(),
            max_request_bytes: default_max_request_bytes(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
        }
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_cache_ttl_s() -> u64 {
    5
}

fn default_max_samples_per_request() -> usize {
    1000
}

fn default_max_request_bytes() -> usize {
    1_048_576
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Loads configuration from layered `.env` files and the process environment.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the full configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut layered = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            layered.insert(key, value);
        }

        Self::from_vars(layered)
    }

    /// Builds a configuration from an explicit key/value map. Split out from
    /// [`ConfigLoader::load`] so tests can exercise validation without
    /// mutating the process environment.
    pub fn from_vars(mut vars: BTreeMap<String, String>) -> Result<AppConfig, ConfigError> {
        let mut take = |key: &'static str| vars.remove(key).filter(|v| !v.is_empty());

        let database_url = take("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?;
        let redis_url = take("REDIS_URL").ok_or(ConfigError::MissingVar("REDIS_URL"))?;
        let device_tokens =
            take("DEVICE_TOKENS").ok_or(ConfigError::MissingVar("DEVICE_TOKENS"))?;

        let profile = take("PROFILE").unwrap_or_else(default_profile);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);

        let cache_ttl_s = parse_or("CACHE_TTL_S", take("CACHE_TTL_S"), default_cache_ttl_s())?;
        let max_samples_per_request = parse_or(
            "MAX_SAMPLES_PER_REQUEST",
            take("MAX_SAMPLES_PER_REQUEST"),
            default_max_samples_per_request(),
        )?;
        let max_request_bytes = parse_or(
            "MAX_REQUEST_BYTES",
            take("MAX_REQUEST_BYTES"),
            default_max_request_bytes(),
        )?;
        let db_max_connections = parse_or(
            "DB_MAX_CONNECTIONS",
            take("DB_MAX_CONNECTIONS"),
            default_db_max_connections(),
        )?;
        let db_acquire_timeout_ms = parse_or(
            "DB_ACQUIRE_TIMEOUT_MS",
            take("DB_ACQUIRE_TIMEOUT_MS"),
            default_db_acquire_timeout_ms(),
        )?;

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            redis_url,
            device_tokens,
            cache_ttl_s,
            max_samples_per_request,
            max_request_bytes,
            db_max_connections,
            db_acquire_timeout_ms,
        };

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut values = BTreeMap::new();
        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;
        Ok(values)
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    values.insert(key, value);
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "expected a non-negative integer".to_string(),
        }),
    }
}
