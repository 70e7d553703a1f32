//! Runtime configuration from environment variables

use std::env;
use std::time::Duration;

/// Configuration for the graph runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Channel buffer size for edge ingestion (observations)
    pub channel_buffer: usize,

    /// Number of ingestion shards, each running one upsert at a time
    pub max_in_flight: usize,

    /// Observations older than this many days are pruned
    pub retention_days: u64,

    /// Retention sweep interval in milliseconds
    pub sweep_interval_ms: u64,

    /// Enable flag for the retention sweeper
    pub retention_enabled: bool,
}

impl GraphConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `HEXFLOW_DB_PATH` (default: data/hexflow.db)
    /// - `INGEST_CHANNEL_BUFFER` (default: 10000)
    /// - `INGEST_MAX_IN_FLIGHT` (default: 64)
    /// - `NODE_RETENTION_DAYS` (default: 30)
    /// - `RETENTION_SWEEP_INTERVAL_MS` (default: 3600000)
    /// - `ENABLE_RETENTION` (default: true)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("HEXFLOW_DB_PATH").unwrap_or_else(|_| "data/hexflow.db".to_string()),

            channel_buffer: parse_var("INGEST_CHANNEL_BUFFER")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(10_000),

            max_in_flight: parse_var("INGEST_MAX_IN_FLIGHT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(64),

            retention_days: parse_var("NODE_RETENTION_DAYS").unwrap_or(30),

            sweep_interval_ms: parse_var("RETENTION_SWEEP_INTERVAL_MS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(3_600_000),

            retention_enabled: parse_var("ENABLE_RETENTION").unwrap_or(true),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "HEXFLOW_DB_PATH",
        "INGEST_CHANNEL_BUFFER",
        "INGEST_MAX_IN_FLIGHT",
        "NODE_RETENTION_DAYS",
        "RETENTION_SWEEP_INTERVAL_MS",
        "ENABLE_RETENTION",
    ];

    // Env vars are process-global, so defaults and overrides run in one test
    #[test]
    fn test_config_defaults_and_overrides() {
        for var in VARS {
            env::remove_var(var);
        }

        let config = GraphConfig::from_env();
        assert_eq!(config.db_path, "data/hexflow.db");
        assert_eq!(config.channel_buffer, 10_000);
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.retention(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3_600));
        assert!(config.retention_enabled);

        env::set_var("HEXFLOW_DB_PATH", "/tmp/test.db");
        env::set_var("INGEST_CHANNEL_BUFFER", "500");
        env::set_var("INGEST_MAX_IN_FLIGHT", "0");
        env::set_var("NODE_RETENTION_DAYS", "7");
        env::set_var("RETENTION_SWEEP_INTERVAL_MS", "not-a-number");
        env::set_var("ENABLE_RETENTION", "false");

        let config = GraphConfig::from_env();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.channel_buffer, 500);
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.sweep_interval_ms, 3_600_000);
        assert!(!config.retention_enabled);

        // Cleanup
        for var in VARS {
            env::remove_var(var);
        }
    }
}
