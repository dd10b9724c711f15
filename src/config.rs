use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Configuration - environment driven, `.env` honoured
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Scylla,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "scylla" => Ok(StoreBackend::Scylla),
            other => Err(format!("expected memory or scylla, got {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub scylla_nodes: Vec<String>,
    pub scylla_keyspace: String,
    /// Enables the atomic per-day order counter when set
    pub redis_url: Option<String>,
    pub order_number_max_attempts: u32,
    pub connection_buffer: usize,
    pub invoice_base_url: String,
    pub metrics_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            scylla_nodes: vec!["127.0.0.1:9042".to_string()],
            scylla_keyspace: "orders_ks".to_string(),
            redis_url: None,
            order_number_max_attempts: 10,
            connection_buffer: 256,
            invoice_base_url: "http://localhost:8080/invoices".to_string(),
            metrics_port: 9090,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            store: parse(&get, "ORDER_STORE", defaults.store)?,
            scylla_nodes: get("SCYLLA_NODES")
                .map(|nodes| {
                    nodes
                        .split(',')
                        .map(|node| node.trim().to_string())
                        .filter(|node| !node.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.scylla_nodes),
            scylla_keyspace: get("SCYLLA_KEYSPACE").unwrap_or(defaults.scylla_keyspace),
            redis_url: get("REDIS_URL"),
            order_number_max_attempts: parse(
                &get,
                "ORDER_NUMBER_MAX_ATTEMPTS",
                defaults.order_number_max_attempts,
            )?,
            connection_buffer: parse(&get, "CONNECTION_BUFFER", defaults.connection_buffer)?,
            invoice_base_url: get("INVOICE_BASE_URL").unwrap_or(defaults.invoice_base_url),
            metrics_port: parse(&get, "METRICS_PORT", defaults.metrics_port)?,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.order_number_max_attempts, 10);
        assert_eq!(config.connection_buffer, 256);
        assert_eq!(config.metrics_port, 9090);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ORDER_STORE", "Scylla"),
            ("SCYLLA_NODES", "10.0.0.1:9042, 10.0.0.2:9042"),
            ("REDIS_URL", "redis://127.0.0.1/"),
            ("METRICS_PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(config.store, StoreBackend::Scylla);
        assert_eq!(config.scylla_nodes, vec!["10.0.0.1:9042", "10.0.0.2:9042"]);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.metrics_port, 9100);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("CONNECTION_BUFFER", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CONNECTION_BUFFER", .. }));
    }
}
