//! order-ingest: Kafka order ingestion with bounded retries and a dead-letter topic.
//!
//! Orders are consumed one at a time, decoded, validated and handed to the
//! downstream store under an exponential-backoff retry policy. Messages that
//! cannot be processed are wrapped in a self-describing envelope and published
//! to a quarantine topic; offsets are committed only once a message is either
//! stored or quarantined.
//!
//! # Example
//!
//! ```ignore
//! use order_ingest::{Config, run_pipeline, telemetry::Telemetry};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::from_file("config.yaml")?;
//! let telemetry = Telemetry::init(&config.service);
//! run_pipeline(config, &telemetry, CancellationToken::new()).await?;
//! telemetry.shutdown()?;
//! ```

pub mod config;
pub mod consumer;
pub mod dlq;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod order;
pub mod pipeline;
pub mod propagation;
pub mod retry;
pub mod service;
pub mod shutdown;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use pipeline::{Pipeline, run_pipeline};
