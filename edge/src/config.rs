//! Edge daemon configuration loaded from environment variables.
//!
//! All values come from environment variables or a `.env` file; required
//! variables must be set and every constraint is checked before any network
//! I/O. The device token is never logged; the startup summary carries a
//! non-reversible fingerprint instead.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur while loading the edge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Edge daemon configuration for the inverter-to-server pipeline.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// WiNet-S dongle IP address or hostname on the local LAN
    pub sungrow_host: String,
    /// Modbus TCP port
    pub sungrow_port: u16,
    /// Modbus slave / unit ID
    pub sungrow_slave_id: u8,
    /// Delay between Modbus poll cycles
    pub poll_interval: Duration,
    /// Delay between register group reads within one poll cycle
    pub inter_register_delay: Duration,
    /// Device identifier sent in samples; defaults to the inverter host
    pub device_id: String,
    /// Maximum samples per upload batch
    pub batch_size: usize,
    /// Delay between upload attempts
    pub upload_interval: Duration,
    /// SQLite spool file path
    pub spool_path: PathBuf,
    /// Ingest server base URL; must be HTTPS
    pub vps_base_url: String,
    /// Per-device bearer token for server auth
    pub vps_device_token: String,
    /// Upload backoff cap
    pub max_backoff: Duration,
    /// Health heartbeat file path
    pub health_path: PathBuf,
    /// Log filter when RUST_LOG is not set
    pub log_level: String,
}

impl EdgeConfig {
    /// Loads configuration from a `.env` file (if present) and the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(env::vars().collect())
    }

    /// Builds a configuration from an explicit key/value map so tests can
    /// exercise validation without touching the process environment.
    pub fn from_vars(mut vars: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut take = |key: &'static str| vars.remove(key).filter(|v| !v.is_empty());

        let sungrow_host = take("SUNGROW_HOST").ok_or(ConfigError::MissingVar("SUNGROW_HOST"))?;
        let vps_base_url = take("VPS_BASE_URL").ok_or(ConfigError::MissingVar("VPS_BASE_URL"))?;
        let vps_device_token =
            take("VPS_DEVICE_TOKEN").ok_or(ConfigError::MissingVar("VPS_DEVICE_TOKEN"))?;

        // All edge-to-server traffic is HTTPS with certificate verification;
        // plain HTTP is rejected before any connection is attempted.
        if !vps_base_url.to_lowercase().starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "VPS_BASE_URL",
                value: vps_base_url,
                reason: "must use HTTPS",
            });
        }

        let sungrow_port = parse_range("SUNGROW_PORT", take("SUNGROW_PORT"), 502, 1, 65535)? as u16;
        let sungrow_slave_id =
            parse_range("SUNGROW_SLAVE_ID", take("SUNGROW_SLAVE_ID"), 1, 1, 247)? as u8;
        let poll_interval_s =
            parse_range("POLL_INTERVAL_S", take("POLL_INTERVAL_S"), 5, 5, i64::MAX)?;
        let inter_register_delay_ms = parse_range(
            "INTER_REGISTER_DELAY_MS",
            take("INTER_REGISTER_DELAY_MS"),
            20,
            0,
            i64::MAX,
        )?;
        let batch_size = parse_range("BATCH_SIZE", take("BATCH_SIZE"), 30, 1, 1000)? as usize;
        let upload_interval_s = parse_range(
            "UPLOAD_INTERVAL_S",
            take("UPLOAD_INTERVAL_S"),
            10,
            1,
            i64::MAX,
        )?;
        let max_backoff_s = parse_range("MAX_BACKOFF_S", take("MAX_BACKOFF_S"), 300, 1, i64::MAX)?;

        let device_id = take("DEVICE_ID").unwrap_or_else(|| sungrow_host.clone());
        let spool_path = take("SPOOL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/data/spool.db"));
        let health_path = take("HEALTH_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/data/health.json"));
        let log_level = take("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            sungrow_host,
            sungrow_port,
            sungrow_slave_id,
            poll_interval: Duration::from_secs(poll_interval_s as u64),
            inter_register_delay: Duration::from_millis(inter_register_delay_ms as u64),
            device_id,
            batch_size,
            upload_interval: Duration::from_secs(upload_interval_s as u64),
            spool_path,
            vps_base_url,
            vps_device_token,
            max_backoff: Duration::from_secs(max_backoff_s as u64),
            health_path,
            log_level,
        })
    }

    /// Logs a startup summary with the device token masked.
    pub fn log_summary(&self) {
        tracing::info!(
            sungrow_host = %self.sungrow_host,
            sungrow_port = self.sungrow_port,
            sungrow_slave_id = self.sungrow_slave_id,
            poll_interval_s = self.poll_interval.as_secs(),
            upload_interval_s = self.upload_interval.as_secs(),
            inter_register_delay_ms = self.inter_register_delay.as_millis() as u64,
            batch_size = self.batch_size,
            spool_path = %self.spool_path.display(),
            device_id = %self.device_id,
            vps_base_url = %self.vps_base_url,
            vps_token_masked = %masked_token(&self.vps_device_token),
            "edge daemon starting"
        );
    }
}

/// Short non-reversible token fingerprint for diagnostics.
pub fn masked_token(value: &str) -> String {
    if value.is_empty() {
        return "empty".to_string();
    }
    let digest = Sha256::digest(value.as_bytes());
    let hex: String = digest.iter().take(5).map(|b| format!("{b:02x}")).collect();
    format!("len={} sha256={}", value.len(), hex)
}

fn parse_range(
    key: &'static str,
    value: Option<String>,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let parsed = match value {
        None => default,
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: "expected an integer",
        })?,
    };
    if parsed < min || parsed > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: parsed.to_string(),
            reason: "out of range",
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_vars() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("SUNGROW_HOST".to_string(), "192.168.1.10".to_string()),
            (
                "VPS_BASE_URL".to_string(),
                "https://solar.example.com".to_string(),
            ),
            ("VPS_DEVICE_TOKEN".to_string(), "tok-123".to_string()),
        ])
    }

    #[test]
    fn defaults_applied() {
        let config = EdgeConfig::from_vars(required_vars()).unwrap();
        assert_eq!(config.sungrow_port, 502);
        assert_eq!(config.sungrow_slave_id, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.inter_register_delay, Duration::from_millis(20));
        assert_eq!(config.batch_size, 30);
        assert_eq!(config.upload_interval, Duration::from_secs(10));
        assert_eq!(config.max_backoff, Duration::from_secs(300));
        assert_eq!(config.spool_path, PathBuf::from("/data/spool.db"));
        // device_id falls back to the inverter host
        assert_eq!(config.device_id, "192.168.1.10");
    }

    #[test]
    fn missing_host_is_fatal() {
        let mut vars = required_vars();
        vars.remove("SUNGROW_HOST");
        assert!(matches!(
            EdgeConfig::from_vars(vars),
            Err(ConfigError::MissingVar("SUNGROW_HOST"))
        ));
    }

    #[test]
    fn http_base_url_is_rejected() {
        let mut vars = required_vars();
        vars.insert(
            "VPS_BASE_URL".to_string(),
            "http://solar.example.com".to_string(),
        );
        assert!(matches!(
            EdgeConfig::from_vars(vars),
            Err(ConfigError::InvalidValue {
                key: "VPS_BASE_URL",
                ..
            })
        ));
    }

    #[test]
    fn poll_interval_below_minimum_is_rejected() {
        let mut vars = required_vars();
        vars.insert("POLL_INTERVAL_S".to_string(), "2".to_string());
        assert!(EdgeConfig::from_vars(vars).is_err());
    }

    #[test]
    fn batch_size_bounds_enforced() {
        let mut vars = required_vars();
        vars.insert("BATCH_SIZE".to_string(), "0".to_string());
        assert!(EdgeConfig::from_vars(vars.clone()).is_err());
        vars.insert("BATCH_SIZE".to_string(), "1001".to_string());
        assert!(EdgeConfig::from_vars(vars).is_err());
    }

    #[test]
    fn slave_id_bounds_enforced() {
        let mut vars = required_vars();
        vars.insert("SUNGROW_SLAVE_ID".to_string(), "248".to_string());
        assert!(EdgeConfig::from_vars(vars).is_err());
    }

    #[test]
    fn explicit_device_id_wins() {
        let mut vars = required_vars();
        vars.insert("DEVICE_ID".to_string(), "inv-01".to_string());
        let config = EdgeConfig::from_vars(vars).unwrap();
        assert_eq!(config.device_id, "inv-01");
    }

    #[test]
    fn masked_token_does_not_leak() {
        let masked = masked_token("super-secret-token");
        assert!(!masked.contains("super-secret-token"));
        assert!(masked.starts_with("len=18"));
        assert_eq!(masked_token(""), "empty");
    }
}
