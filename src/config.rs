//! Server configuration, read from the environment and an optional `.env` file.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::rates::{DEFAULT_RATE, normalize_rate};
use crate::validation::parse_decimal;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Invalid log filter '{0}': {1}")]
    InvalidLogFilter(String, String),

    #[error("Invalid default interest rate: {0}")]
    InvalidRate(String),
}

/// Mortgage server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `EnvFilter` directives used when `RUST_LOG` is unset, e.g. `info` or `mortgage_calc=debug`
    pub log_filter: String,
    /// Rate the ledger is seeded with at startup
    pub default_rate: Decimal,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_filter: "info".to_string(),
            default_rate: DEFAULT_RATE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup.
    ///
    /// `PORT` is honoured for hosting platforms, `MORTGAGE_PORT` overrides it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(host) = lookup("MORTGAGE_HOST") {
            cfg.host = host;
        }
        for key in ["PORT", "MORTGAGE_PORT"] {
            if let Some(port) = lookup(key) {
                cfg.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
            }
        }
        if let Some(filter) = lookup("MORTGAGE_LOG_LEVEL") {
            EnvFilter::try_new(&filter)
                .map_err(|e| ConfigError::InvalidLogFilter(filter.clone(), e.to_string()))?;
            cfg.log_filter = filter;
        }
        if let Some(rate) = lookup("MORTGAGE_DEFAULT_RATE") {
            cfg.default_rate = parse_decimal(&rate)
                .and_then(|parsed| normalize_rate(parsed).ok())
                .ok_or(ConfigError::InvalidRate(rate))?;
        }

        Ok(cfg)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::from_lookup(|_| None).unwrap();

        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.default_rate, dec!(0.025));
    }

    #[test]
    fn test_overrides() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("MORTGAGE_PORT", "9100"),
            ("MORTGAGE_HOST", "127.0.0.1"),
            ("MORTGAGE_LOG_LEVEL", "warn,mortgage_calc=debug"),
            ("MORTGAGE_DEFAULT_RATE", "0.0315"),
        ]))
        .unwrap();

        assert_eq!(cfg.socket_addr(), "127.0.0.1:9100");
        assert_eq!(cfg.log_filter, "warn,mortgage_calc=debug");
        assert_eq!(cfg.default_rate, dec!(0.0315));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ServerConfig::from_lookup(lookup_from(&[("PORT", "http")])),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup_from(&[("MORTGAGE_LOG_LEVEL", "mortgage_calc=loud")])),
            Err(ConfigError::InvalidLogFilter(..))
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup_from(&[("MORTGAGE_DEFAULT_RATE", "12")])),
            Err(ConfigError::InvalidRate(_))
        ));
    }
}
