//! Internal events for metrics emission.
//!
//! Each struct describes something measurable in the ingestion pipeline and
//! records its Prometheus metric when emitted.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// A message was fetched from the source topic.
pub struct MessageConsumed {
    pub topic: String,
}

impl InternalEvent for MessageConsumed {
    fn emit(self) {
        trace!(topic = %self.topic, "Message consumed");
        counter!("order_ingest_messages_consumed_total", "topic" => self.topic).increment(1);
    }
}

/// How a message left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Processed,
    Quarantined,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Processed => "processed",
            Resolution::Quarantined => "quarantined",
        }
    }
}

/// A message was resolved and is safe to commit.
pub struct MessageResolved {
    pub resolution: Resolution,
}

impl InternalEvent for MessageResolved {
    fn emit(self) {
        trace!(resolution = self.resolution.as_str(), "Message resolved");
        counter!(
            "order_ingest_messages_resolved_total",
            "resolution" => self.resolution.as_str()
        )
        .increment(1);
    }
}

/// Why a message was sent to the dead-letter topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineReason {
    Decode,
    Validation,
    Terminal,
    Exhausted,
}

impl QuarantineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineReason::Decode => "decode",
            QuarantineReason::Validation => "validation",
            QuarantineReason::Terminal => "terminal",
            QuarantineReason::Exhausted => "exhausted",
        }
    }
}

/// A message was written to the dead-letter topic.
pub struct MessageQuarantined {
    pub reason: QuarantineReason,
}

impl InternalEvent for MessageQuarantined {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), "Message quarantined");
        counter!(
            "order_ingest_messages_quarantined_total",
            "reason" => self.reason.as_str()
        )
        .increment(1);
    }
}

/// A failed attempt will be retried after `delay`.
pub struct RetryScheduled {
    pub attempt: u32,
    pub delay: Duration,
}

impl InternalEvent for RetryScheduled {
    fn emit(self) {
        trace!(
            attempt = self.attempt,
            delay_ms = self.delay.as_millis(),
            "Retry scheduled"
        );
        counter!("order_ingest_retries_total").increment(1);
        histogram!("order_ingest_retry_backoff_seconds").record(self.delay.as_secs_f64());
    }
}

/// A dead-letter write failed or timed out.
pub struct DlqPublishFailed;

impl InternalEvent for DlqPublishFailed {
    fn emit(self) {
        trace!("DLQ publish failed");
        counter!("order_ingest_dlq_publish_failures_total").increment(1);
    }
}

/// An offset was committed.
pub struct OffsetCommitted {
    pub partition: i32,
}

impl InternalEvent for OffsetCommitted {
    fn emit(self) {
        trace!(partition = self.partition, "Offset committed");
        counter!(
            "order_ingest_offsets_committed_total",
            "partition" => self.partition.to_string()
        )
        .increment(1);
    }
}

/// Time from fetch to resolution of one message.
pub struct MessageHandled {
    pub duration: Duration,
}

impl InternalEvent for MessageHandled {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Message handled");
        histogram!("order_ingest_message_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// The cache janitor removed expired entries.
pub struct CacheEvicted {
    pub count: usize,
}

impl InternalEvent for CacheEvicted {
    fn emit(self) {
        trace!(count = self.count, "Cache entries evicted");
        counter!("order_ingest_cache_evictions_total").increment(self.count as u64);
    }
}
