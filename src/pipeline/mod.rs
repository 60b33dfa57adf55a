//! Ingestion pipeline.
//!
//! Wires the Kafka source, the order handler and the dead-letter forwarder
//! into one sequential consumer, and tears everything down on shutdown.

mod handler;
mod signal;

pub use handler::OrderHandler;
pub use signal::shutdown_signal;

use opentelemetry::trace::Tracer;
use snafu::prelude::*;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::consumer::Consumer;
use crate::dlq::DeadLetterForwarder;
use crate::error::{ConsumerError, ConsumerSnafu, PipelineError, ShutdownSnafu};
use crate::service::{InMemoryRepository, OrderCache, OrderService};
use crate::shutdown::Closer;
use crate::telemetry::Telemetry;
use crate::transport::{KafkaPublisher, KafkaSource, MessageSource};

/// One consumer loop plus the handler it drives.
pub struct Pipeline<S, T> {
    consumer: Consumer<S, T>,
    handler: OrderHandler,
}

impl<S, T> Pipeline<S, T>
where
    S: MessageSource,
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    pub fn new(consumer: Consumer<S, T>, handler: OrderHandler) -> Self {
        Self { consumer, handler }
    }

    pub fn consumer(&self) -> &Consumer<S, T> {
        &self.consumer
    }

    /// Run until shutdown (a clean stop) or the first unrecoverable error.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<(), ConsumerError> {
        match self.consumer.read(shutdown, &self.handler).await {
            Err(e) if e.is_cancelled() => {
                info!("Pipeline stopped");
                Ok(())
            }
            other => other,
        }
    }
}

/// Build the production pipeline from `config` and run it until `shutdown`.
pub async fn run_pipeline(
    config: Config,
    telemetry: &Telemetry,
    shutdown: CancellationToken,
) -> Result<(), PipelineError> {
    let closer = Closer::new();

    let source = KafkaSource::new(&config.kafka)?;
    closer.add("kafka-consumer", {
        let source = source.clone();
        move || async move {
            source.close();
            Ok::<_, Infallible>(())
        }
    });

    let publisher = KafkaPublisher::new(&config.kafka)?;
    closer.add("kafka-producer", {
        let publisher = publisher.clone();
        let timeout = config.shutdown.timeout();
        move || async move { publisher.close(timeout).await }
    });

    let cache = OrderCache::new(config.cache.ttl());
    cache.start_janitor(config.cache.janitor_interval());
    closer.add("order-cache", {
        let cache = cache.clone();
        move || async move {
            cache.close();
            Ok::<_, Infallible>(())
        }
    });

    let service = OrderService::new(Arc::new(InMemoryRepository::new()), cache);
    let forwarder = DeadLetterForwarder::new(
        Arc::new(publisher),
        config.kafka.dlq_topic.clone(),
        telemetry.propagator().clone(),
    )
    .with_write_timeout(config.dlq.write_timeout());
    let handler = OrderHandler::new(Arc::new(service), forwarder, config.retry.policy());
    let consumer = Consumer::new(source, telemetry.tracer(), telemetry.propagator().clone());
    let pipeline = Pipeline::new(consumer, handler);

    info!(
        topic = %config.kafka.topic,
        group_id = %config.kafka.group_id,
        dlq_topic = %config.kafka.dlq_topic,
        max_retries = config.retry.max_retries,
        "Order ingestion started"
    );
    let result = pipeline.run(&shutdown).await;

    // A fatal consumer error also has to stop the metrics server.
    shutdown.cancel();
    let closed = closer.close_all(config.shutdown.timeout()).await;

    result.context(ConsumerSnafu)?;
    closed.context(ShutdownSnafu)?;
    Ok(())
}
