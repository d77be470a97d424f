//! Configuration module for the LifeLink backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::domain::{DeferralPolicy, DEFAULT_DEFERRAL_DAYS, MAX_DEFERRAL_DAYS};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key the identity gateway presents on every API call
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Days a donor must wait between donations
    pub deferral_days: i64,
}

/// Invalid configuration value.
#[derive(Debug)]
pub struct ConfigError(String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("LIFELINK_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("LIFELINK_DB_PATH")
            .unwrap_or_else(|_| "./data/lifelink.sqlite".to_string())
            .into();

        let bind_addr = env::var("LIFELINK_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| ConfigError(format!("Invalid LIFELINK_BIND_ADDR: {}", e)))?;

        let log_level = env::var("LIFELINK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = match env::var("LIFELINK_LOG_FORMAT") {
            Ok(raw) => parse_log_format(&raw)?,
            Err(_) => false,
        };

        let deferral_days = match env::var("LIFELINK_DEFERRAL_DAYS") {
            Ok(raw) => parse_deferral_days(&raw)?,
            Err(_) => DEFAULT_DEFERRAL_DAYS,
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
            deferral_days,
        })
    }

    pub fn deferral_policy(&self) -> DeferralPolicy {
        DeferralPolicy::from_days(self.deferral_days)
    }
}

fn parse_log_format(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "text" | "pretty" => Ok(false),
        "json" => Ok(true),
        _ => Err(ConfigError(format!(
            "Invalid LIFELINK_LOG_FORMAT '{}': expected text or json",
            raw
        ))),
    }
}

fn parse_deferral_days(raw: &str) -> Result<i64, ConfigError> {
    match raw.trim().parse::<i64>() {
        Ok(days) if (1..=MAX_DEFERRAL_DAYS).contains(&days) => Ok(days),
        _ => Err(ConfigError(format!(
            "Invalid LIFELINK_DEFERRAL_DAYS '{}': expected a number of days between 1 and {}",
            raw, MAX_DEFERRAL_DAYS
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("LIFELINK_API_PSK");
        env::remove_var("LIFELINK_DB_PATH");
        env::remove_var("LIFELINK_BIND_ADDR");
        env::remove_var("LIFELINK_LOG_LEVEL");
        env::remove_var("LIFELINK_DEFERRAL_DAYS");
        env::remove_var("LIFELINK_LOG_FORMAT");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/lifelink.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.deferral_days, 90);
        assert_eq!(config.deferral_policy(), DeferralPolicy::default());
    }

    #[test]
    fn test_deferral_days_parsing() {
        assert_eq!(parse_deferral_days("56").unwrap(), 56);
        assert_eq!(parse_deferral_days(" 90 ").unwrap(), 90);
        assert!(parse_deferral_days("0").is_err());
        assert!(parse_deferral_days("-3").is_err());
        assert!(parse_deferral_days("ninety").is_err());
        assert_eq!(parse_deferral_days("3650").unwrap(), 3650);
        assert!(parse_deferral_days("3651").is_err());
        assert!(parse_deferral_days("200000000").is_err());
        assert!(parse_deferral_days("200000000000000").is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert!(parse_log_format("JSON").unwrap());
        assert!(!parse_log_format("text").unwrap());
        assert!(parse_log_format("xml").is_err());
    }
}
