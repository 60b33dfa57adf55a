//! Configuration loading and validation.
//!
//! Configuration is read from a YAML file after environment variable
//! interpolation (see [`vars`]), then validated.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, DlqTopicLoopSnafu, EmptyBrokersSnafu, EmptyDlqTopicSnafu, EmptyTopicSnafu,
    EnvInterpolationSnafu, InvalidRetrySnafu, ReadFileSnafu, YamlParseSnafu, ZeroCacheTtlSnafu,
};
use crate::retry::RetryPolicy;

/// Main configuration structure for the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Kafka connection and topic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap brokers, e.g. `["kafka:9092"]`.
    pub brokers: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_dlq_topic")]
    pub dlq_topic: String,
    /// Extra librdkafka properties passed through verbatim.
    #[serde(default)]
    pub client_options: HashMap<String, String>,
}

fn default_topic() -> String {
    "orders".to_string()
}

fn default_group_id() -> String {
    "orders-consumer".to_string()
}

fn default_dlq_topic() -> String {
    "orders.dlq".to_string()
}

/// Retry/backoff settings for downstream processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Dead-letter publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqConfig {
    /// Upper bound on a single quarantine write (default: 5000).
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl DlqConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

/// Order cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Janitor sweep interval: the TTL, but at most one minute.
    pub fn janitor_interval(&self) -> Duration {
        self.ttl().min(Duration::from_secs(60))
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Service identity, used for the tracer resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_service_env")]
    pub env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            env: default_service_env(),
        }
    }
}

fn default_service_name() -> String {
    "order-ingest".to_string()
}

fn default_service_env() -> String {
    "dev".to_string()
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file, optionally interpolating environment variables.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content, interpolate_env)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str, interpolate_env: bool) -> Result<Self, ConfigError> {
        let content = if interpolate_env {
            let result = vars::interpolate(content);
            ensure!(
                result.is_ok(),
                EnvInterpolationSnafu {
                    message: result.errors.join("\n"),
                }
            );
            result.text
        } else {
            content.to_string()
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let kafka = &self.kafka;
        ensure!(
            kafka.brokers.iter().any(|b| !b.trim().is_empty()),
            EmptyBrokersSnafu
        );
        ensure!(!kafka.topic.is_empty(), EmptyTopicSnafu);
        ensure!(!kafka.dlq_topic.is_empty(), EmptyDlqTopicSnafu);
        ensure!(
            kafka.dlq_topic != kafka.topic,
            DlqTopicLoopSnafu {
                topic: kafka.topic.clone(),
            }
        );

        ensure!(
            self.retry.base_backoff_ms > 0,
            InvalidRetrySnafu {
                message: "base_backoff_ms must be greater than zero",
            }
        );
        ensure!(
            self.retry.base_backoff_ms <= self.retry.max_backoff_ms,
            InvalidRetrySnafu {
                message: format!(
                    "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                    self.retry.base_backoff_ms, self.retry.max_backoff_ms
                ),
            }
        );

        ensure!(self.cache.ttl_secs > 0, ZeroCacheTtlSnafu);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
kafka:
  brokers: ["localhost:9092"]
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(MINIMAL, false).unwrap();
        assert_eq!(config.kafka.topic, "orders");
        assert_eq!(config.kafka.group_id, "orders-consumer");
        assert_eq!(config.kafka.dlq_topic, "orders.dlq");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_backoff_ms, 200);
        assert_eq!(config.retry.max_backoff_ms, 5_000);
        assert_eq!(config.dlq.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.janitor_interval(), Duration::from_secs(60));
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(10));
        assert!(config.metrics.enabled);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_full_config_parsing() {
        let yaml = r#"
kafka:
  brokers: ["kafka-1:9092", "kafka-2:9092"]
  topic: orders-v2
  group_id: ingest
  dlq_topic: orders-v2.dlq
  client_options:
    session.timeout.ms: "6000"
retry:
  max_retries: 3
  base_backoff_ms: 100
  max_backoff_ms: 1000
cache:
  ttl_secs: 30
logging:
  level: debug
  json: true
metrics:
  enabled: false
"#;
        let config = Config::from_yaml(yaml, false).unwrap();
        assert_eq!(config.kafka.brokers.len(), 2);
        assert_eq!(
            config.kafka.client_options.get("session.timeout.ms"),
            Some(&"6000".to_string())
        );
        let policy = config.retry.policy();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(config.cache.janitor_interval(), Duration::from_secs(30));
        assert!(config.logging.json);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_rejects_empty_brokers() {
        let err = Config::from_yaml("kafka:\n  brokers: []\n", false).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyBrokers));
    }

    #[test]
    fn test_rejects_dlq_loop() {
        let yaml = "kafka:\n  brokers: [b:9092]\n  topic: orders\n  dlq_topic: orders\n";
        let err = Config::from_yaml(yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::DlqTopicLoop { .. }));
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let yaml = format!("{MINIMAL}retry:\n  base_backoff_ms: 6000\n  max_backoff_ms: 5000\n");
        let err = Config::from_yaml(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRetry { .. }));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let yaml = format!("{MINIMAL}cache:\n  ttl_secs: 0\n");
        let err = Config::from_yaml(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCacheTtl));
    }

    #[test]
    fn test_missing_variable_fails_load() {
        let yaml = "kafka:\n  brokers: [\"$ORDER_INGEST_TEST_NEVER_SET_BROKER\"]\n";
        let err = Config::from_yaml(yaml, true).unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }
}
