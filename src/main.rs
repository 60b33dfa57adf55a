//! order-ingest: consumes orders from Kafka, stores them, and quarantines
//! the ones that cannot be processed.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use order_ingest::config::Config;
use order_ingest::error::{
    AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError, TelemetrySnafu,
};
use order_ingest::logging::init_tracing;
use order_ingest::metrics;
use order_ingest::pipeline::{run_pipeline, shutdown_signal};
use order_ingest::telemetry::Telemetry;

/// Kafka order ingestion service.
#[derive(Parser, Debug)]
#[command(name = "order-ingest")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides `logging.level`.
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run - validate configuration and exit.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();
    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, config.logging.json);
    info!(service = %config.service.name, env = %config.service.env, "order-ingest starting");

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Brokers: {}", config.kafka.brokers.join(","));
        info!("Topic: {} (group {})", config.kafka.topic, config.kafka.group_id);
        info!("DLQ topic: {}", config.kafka.dlq_topic);
        info!(
            "Retry: max {} retries, backoff {}ms..{}ms",
            config.retry.max_retries, config.retry.base_backoff_ms, config.retry.max_backoff_ms
        );
        info!("Cache TTL: {}s", config.cache.ttl_secs);
        info!("Configuration is valid");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr, shutdown.clone()).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    let telemetry = Telemetry::init(&config.service);
    let result = run_pipeline(config, &telemetry, shutdown).await;
    telemetry.shutdown().context(TelemetrySnafu)?;
    result?;

    info!("order-ingest stopped");
    Ok(())
}
