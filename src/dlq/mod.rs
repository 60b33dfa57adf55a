//! Dead-letter forwarding for messages that cannot be processed.
//!
//! A quarantined message is wrapped in a [`DlqEnvelope`] and published to the
//! dead-letter topic with descriptive headers, so the quarantine topic can be
//! inspected without parsing envelope bodies.

mod envelope;

pub use envelope::{DlqEnvelope, EnvelopeHeader, OriginalMessage, format_failed_at};

use chrono::Utc;
use opentelemetry::Context;
use snafu::prelude::*;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::emit;
use crate::error::{DlqError, DlqPublishSnafu, DlqSerializeSnafu, DlqTimeoutSnafu};
use crate::metrics::events::DlqPublishFailed;
use crate::propagation::TracePropagator;
use crate::transport::{Header, MessagePublisher, OutboundMessage, RawMessage};

pub const HEADER_ORIG_TOPIC: &str = "x-orig-topic";
pub const HEADER_ORIG_PARTITION: &str = "x-orig-partition";
pub const HEADER_ORIG_OFFSET: &str = "x-orig-offset";
pub const HEADER_RETRIES: &str = "x-retries";
pub const HEADER_ERROR: &str = "x-error";
pub const HEADER_FAILED_AT: &str = "x-failed-at";

/// Default bound on a single quarantine write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes unprocessable messages to the dead-letter topic.
#[derive(Clone)]
pub struct DeadLetterForwarder {
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
    propagator: TracePropagator,
    write_timeout: Duration,
}

impl DeadLetterForwarder {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        topic: impl Into<String>,
        propagator: TracePropagator,
    ) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            propagator,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Quarantine `msg`.
    ///
    /// The write is bounded by the forwarder's write timeout; callers that
    /// need shutdown to interrupt it race the returned future themselves.
    /// On error the message is not resolved and must not be committed.
    pub async fn send(
        &self,
        cx: &Context,
        msg: &RawMessage,
        cause: &(dyn Display + Sync),
        retries: u32,
    ) -> Result<(), DlqError> {
        let reason = cause.to_string();
        let failed_at = Utc::now();
        let envelope = DlqEnvelope::new(msg, reason.clone(), retries, failed_at);
        let payload = serde_json::to_vec(&envelope).context(DlqSerializeSnafu)?;

        let mut headers = vec![
            Header::new(HEADER_ORIG_TOPIC, msg.topic.as_str()),
            Header::new(HEADER_ORIG_PARTITION, msg.partition.to_string()),
            Header::new(HEADER_ORIG_OFFSET, msg.offset.to_string()),
            Header::new(HEADER_RETRIES, retries.to_string()),
            Header::new(HEADER_ERROR, reason.as_str()),
            Header::new(HEADER_FAILED_AT, format_failed_at(&failed_at)),
        ];
        self.propagator.inject(cx, &mut headers);

        let outbound = OutboundMessage {
            topic: self.topic.clone(),
            key: msg.key.clone(),
            payload,
            headers,
        };

        let published = tokio::time::timeout(self.write_timeout, self.publisher.publish(outbound));
        let result = match published.await {
            Ok(published) => published.context(DlqPublishSnafu),
            Err(_) => DlqTimeoutSnafu {
                timeout: self.write_timeout,
            }
            .fail(),
        };

        match &result {
            Ok(()) => info!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                retries,
                reason = %reason,
                dlq_topic = %self.topic,
                "Message quarantined"
            ),
            Err(e) => {
                emit!(DlqPublishFailed);
                warn!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "DLQ write failed"
                );
            }
        }
        result
    }
}
