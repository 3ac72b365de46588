use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL. When absent the in-memory ledger and lock
    /// store are used.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub optimistic: OptimisticConfig,
    #[serde(default)]
    pub distributed: DistributedConfig,
    #[serde(default)]
    pub stress: StressConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "ledger_locks.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            gateway: GatewayConfig::default(),
            postgres_url: None,
            ledger: LedgerConfig::default(),
            optimistic: OptimisticConfig::default(),
            distributed: DistributedConfig::default(),
            stress: StressConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// The two fixed account ids
    pub accounts: [String; 2],
    pub initial_balance: i64,
    /// Upper bound on row-lock waits, 0 = wait as long as the database lets us
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            accounts: ["account_a".to_string(), "account_b".to_string()],
            initial_balance: 100_000,
            lock_timeout_ms: 0,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OptimisticConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
        }
    }
}

impl OptimisticConfig {
    /// Backoff before the retry that follows attempt `attempt_index` (0-based).
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DistributedConfig {
    pub key_prefix: String,
    pub lock_ttl_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            key_prefix: "transfer_lock:".to_string(),
            lock_ttl_ms: 10_000,
            max_attempts: 50,
            retry_delay_ms: 100,
        }
    }
}

impl DistributedConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StressConfig {
    pub requests: usize,
    pub amount: i64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            amount: 10_000,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: never
gateway:
  host: 0.0.0.0
  port: 8000
"#;

    #[test]
    fn test_sections_default_when_missing() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.ledger.initial_balance, 100_000);
        assert_eq!(config.ledger.accounts[0], "account_a");
        assert_eq!(config.optimistic.max_attempts, 5);
        assert_eq!(config.distributed.max_attempts, 50);
        assert_eq!(config.distributed.key_prefix, "transfer_lock:");
        assert_eq!(config.stress.requests, 10);
        assert!(config.ledger.lock_timeout().is_none());
    }

    #[test]
    fn test_optimistic_backoff_doubles() {
        let cfg = OptimisticConfig::default();
        assert_eq!(cfg.backoff(0), Duration::from_millis(10));
        assert_eq!(cfg.backoff(1), Duration::from_millis(20));
        assert_eq!(cfg.backoff(3), Duration::from_millis(80));
        // No overflow panic on silly inputs
        assert_eq!(cfg.backoff(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_dev_config_parses() {
        let content = include_str!("../config/dev.yaml");
        let config = AppConfig::from_yaml(content).unwrap();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.distributed.lock_ttl(), Duration::from_secs(10));
    }
}
