//! Error types for order-ingest using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;
use std::time::Duration;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// No Kafka brokers configured.
    #[snafu(display("Kafka brokers cannot be empty"))]
    EmptyBrokers,

    /// Source topic is empty.
    #[snafu(display("Kafka topic cannot be empty"))]
    EmptyTopic,

    /// Dead-letter topic is empty.
    #[snafu(display("Kafka DLQ topic cannot be empty"))]
    EmptyDlqTopic,

    /// Dead-letter topic would feed back into the consumer.
    #[snafu(display("DLQ topic must differ from the source topic '{topic}'"))]
    DlqTopicLoop { topic: String },

    /// Retry backoff settings are inconsistent.
    #[snafu(display("Invalid retry configuration: {message}"))]
    InvalidRetry { message: String },

    /// Cache TTL is zero.
    #[snafu(display("Cache TTL must be greater than zero"))]
    ZeroCacheTtl,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}

// ============ Transport Errors ============

/// Errors raised by the queue transport (fetch, commit, publish).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// Failed to build a Kafka client.
    #[snafu(display("Failed to create Kafka client: {source}"))]
    ClientCreate { source: rdkafka::error::KafkaError },

    /// Failed to subscribe to the source topic.
    #[snafu(display("Failed to subscribe to topic '{topic}': {source}"))]
    Subscribe {
        topic: String,
        source: rdkafka::error::KafkaError,
    },

    /// Failed to fetch the next message.
    #[snafu(display("Failed to fetch message: {message}"))]
    Fetch { message: String },

    /// Failed to commit a message offset.
    #[snafu(display("Failed to commit {topic}[{partition}]@{offset}: {message}"))]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },

    /// Failed to publish a message.
    #[snafu(display("Failed to publish to '{topic}': {message}"))]
    Publish { topic: String, message: String },
}

// ============ Order Errors ============

/// Errors that can occur while decoding an order payload.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    /// Payload is not a JSON order document.
    #[snafu(display("Failed to decode order payload: {source}"))]
    Json { source: serde_json::Error },
}

/// Errors reported by order validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ValidationError {
    /// One or more field invariants were violated.
    #[snafu(display("Order validation failed: {}", violations.join("; ")))]
    Invalid { violations: Vec<String> },
}

impl ValidationError {
    /// The individual violation messages.
    pub fn violations(&self) -> &[String] {
        match self {
            ValidationError::Invalid { violations } => violations,
        }
    }
}

// ============ Downstream Errors ============

/// Errors returned by the downstream order processor.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ProcessError {
    /// Store is temporarily unreachable.
    #[snafu(display("Order store unavailable: {message}"))]
    Unavailable { message: String },

    /// Store did not answer in time.
    #[snafu(display("Order store timed out: {message}"))]
    Timeout { message: String },

    /// Store refused the order; retrying will not help.
    #[snafu(display("Order rejected: {message}"))]
    Rejected { message: String },

    /// Processing was interrupted by shutdown.
    #[snafu(display("Order processing cancelled"))]
    Cancelled,
}

impl ProcessError {
    /// Whether another attempt may succeed.
    ///
    /// Transient infrastructure failures are retried. Cancellation is not:
    /// it aborts the whole retry sequence.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProcessError::Unavailable { .. } | ProcessError::Timeout { .. }
        )
    }

    /// Whether this error signals shutdown rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled)
    }
}

/// Errors that can occur in an order repository.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum RepositoryError {
    /// Connection to the store failed.
    #[snafu(display("Repository unavailable: {message}"))]
    RepositoryUnavailable { message: String },

    /// Store operation exceeded its deadline.
    #[snafu(display("Repository operation timed out: {message}"))]
    RepositoryTimeout { message: String },

    /// Store rejected the write (constraint or schema violation).
    #[snafu(display("Repository constraint violated: {message}"))]
    Constraint { message: String },

    /// Order does not exist.
    #[snafu(display("Order '{order_uid}' not found"))]
    OrderNotFound { order_uid: String },
}

impl From<RepositoryError> for ProcessError {
    fn from(source: RepositoryError) -> Self {
        match source {
            RepositoryError::RepositoryUnavailable { message } => {
                ProcessError::Unavailable { message }
            }
            RepositoryError::RepositoryTimeout { message } => ProcessError::Timeout { message },
            other => ProcessError::Rejected {
                message: other.to_string(),
            },
        }
    }
}

/// Errors returned by the order cache.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CacheError {
    /// Key was never stored (or was deleted).
    #[snafu(display("Cache key '{key}' not found"))]
    NotFound { key: String },

    /// Key was stored but its TTL elapsed.
    #[snafu(display("Cache key '{key}' expired"))]
    Miss { key: String },
}

// ============ DLQ Errors ============

/// Errors that can occur during Dead Letter Queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., PublishSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to serialize the envelope.
    #[snafu(display("Failed to serialize DLQ envelope: {source}"))]
    DlqSerialize { source: serde_json::Error },

    /// Quarantine topic rejected the write.
    #[snafu(display("Failed to write to DLQ: {source}"))]
    DlqPublish { source: TransportError },

    /// Quarantine write did not finish in time.
    #[snafu(display("DLQ write timed out after {timeout:?}"))]
    DlqTimeout { timeout: Duration },
}

// ============ Pipeline Errors ============

/// Errors a message handler can return to the consumer loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HandlerError {
    /// Message could not be quarantined, so it stays unresolved.
    #[snafu(display("Failed to quarantine message: {source}"))]
    Quarantine { source: DlqError },

    /// Shutdown interrupted handling.
    #[snafu(display("Message handling cancelled"))]
    HandlerCancelled,
}

impl HandlerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HandlerError::HandlerCancelled)
    }
}

/// Errors that stop the consumer loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConsumerError {
    /// Fetching the next message failed.
    #[snafu(display("Consumer fetch failed: {source}"))]
    ConsumerFetch { source: TransportError },

    /// Committing a resolved message failed.
    #[snafu(display("Consumer commit failed: {source}"))]
    ConsumerCommit { source: TransportError },

    /// The handler left a message unresolved.
    #[snafu(display("Message handler failed: {source}"))]
    Handler { source: HandlerError },

    /// Shutdown was requested.
    #[snafu(display("Consumer cancelled"), context(name(ConsumerCancelledSnafu)))]
    Cancelled,
}

impl ConsumerError {
    /// Whether the loop stopped because of shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConsumerError::Cancelled)
    }
}

// ============ Metrics / Telemetry Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

/// Errors from the tracing/telemetry handles.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TelemetryError {
    /// Tracer provider failed to flush or stop.
    #[snafu(display("Failed to shut down tracer provider: {message}"))]
    ProviderShutdown { message: String },
}

/// Errors from closing resources at shutdown.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ShutdownError {
    /// A resource's close function failed.
    #[snafu(display("Failed to close {name}: {message}"))]
    CloseFailed { name: String, message: String },

    /// Resources were still closing when the deadline passed.
    #[snafu(display("Shutdown timed out after {timeout:?}; still closing: {}", pending.join(", ")))]
    ShutdownTimeout {
        timeout: Duration,
        pending: Vec<String>,
    },
}

// ============ Top-level Errors ============

/// Top-level errors surfaced by the binary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Transport setup error.
    #[snafu(display("Transport error: {source}"))]
    Transport { source: TransportError },

    /// Consumer loop stopped with an error.
    #[snafu(display("Consumer error: {source}"))]
    Consumer { source: ConsumerError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Telemetry error.
    #[snafu(display("Telemetry error: {source}"))]
    Telemetry { source: TelemetryError },

    /// Resources did not close cleanly.
    #[snafu(display("Shutdown error: {source}"))]
    Shutdown { source: ShutdownError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<TransportError> for PipelineError {
    fn from(source: TransportError) -> Self {
        PipelineError::Transport { source }
    }
}

impl From<ConsumerError> for PipelineError {
    fn from(source: ConsumerError) -> Self {
        PipelineError::Consumer { source }
    }
}
