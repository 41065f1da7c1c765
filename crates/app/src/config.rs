//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `RESERVATION_TTL_SECS` — reservation lifetime (default: `900`)
/// - `SWEEP_INTERVAL_SECS` — expiry sweep cadence (default: `60`)
/// - `GATEWAY_TIMEOUT_MS` — payment gateway call bound (default: `5000`)
/// - `RETRY_MAX_ATTEMPTS` — bus delivery attempts (default: `5`)
/// - `RETRY_BASE_DELAY_MS` — first retry backoff (default: `50`)
/// - `RETRY_MAX_DELAY_MS` — backoff cap (default: `5000`)
/// - `QUEUE_CAPACITY` — per-consumer-group queue size (default: `256`)
/// - `TAX_RATE_BPS` — tax rate in basis points (default: `0`)
/// - `SHIPPING_FLAT_CENTS` — flat shipping per order (default: `0`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub reservation_ttl: Duration,
    pub sweep_interval: Duration,
    pub gateway_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub queue_capacity: usize,
    pub tax_rate_bps: u32,
    pub shipping_flat_cents: i64,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            reservation_ttl: Duration::from_secs(env_parsed("RESERVATION_TTL_SECS", 900)),
            sweep_interval: Duration::from_secs(env_parsed("SWEEP_INTERVAL_SECS", 60)),
            gateway_timeout: Duration::from_millis(env_parsed("GATEWAY_TIMEOUT_MS", 5000)),
            retry_max_attempts: env_parsed("RETRY_MAX_ATTEMPTS", 5),
            retry_base_delay: Duration::from_millis(env_parsed("RETRY_BASE_DELAY_MS", 50)),
            retry_max_delay: Duration::from_millis(env_parsed("RETRY_MAX_DELAY_MS", 5000)),
            queue_capacity: env_parsed("QUEUE_CAPACITY", 256),
            tax_rate_bps: env_parsed("TAX_RATE_BPS", 0),
            shipping_flat_cents: env_parsed("SHIPPING_FLAT_CENTS", 0),
        }
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
            reservation_ttl: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            gateway_timeout: Duration::from_secs(5),
            retry_max_attempts: 5,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_secs(5),
            queue_capacity: 256,
            tax_rate_bps: 0,
            shipping_flat_cents: 0,
        }
    }
}
