//! rdkafka-backed transport.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{Header, MessagePublisher, MessageSource, OutboundMessage, RawMessage};
use crate::config::KafkaConfig;
use crate::error::{ClientCreateSnafu, SubscribeSnafu, TransportError};

fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", config.brokers.join(","));
    for (key, value) in &config.client_options {
        client.set(key, value);
    }
    client
}

/// Consumer-group member reading the source topic with manual commits.
#[derive(Clone)]
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaSource {
    pub fn new(config: &KafkaConfig) -> Result<Self, TransportError> {
        let mut client = client_config(config);
        client
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");

        let consumer: StreamConsumer = client.create().context(ClientCreateSnafu)?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .context(SubscribeSnafu {
                topic: config.topic.clone(),
            })?;

        info!(
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to source topic"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }

    /// Leave the consumer group.
    pub fn close(&self) {
        self.consumer.unsubscribe();
        debug!(topic = %self.topic, "Consumer unsubscribed");
    }
}

fn to_raw(msg: &BorrowedMessage<'_>) -> RawMessage {
    let headers = msg
        .headers()
        .map(|hs| {
            hs.iter()
                .map(|h| Header::new(h.key, h.value.unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    RawMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(Bytes::copy_from_slice).unwrap_or_default(),
        value: msg.payload().map(Bytes::copy_from_slice).unwrap_or_default(),
        headers,
        timestamp: msg
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis),
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn fetch(&self) -> Result<RawMessage, TransportError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| TransportError::Fetch {
                message: e.to_string(),
            })?;
        Ok(to_raw(&msg))
    }

    async fn commit(&self, msg: &RawMessage) -> Result<(), TransportError> {
        let commit_error = |message: String| TransportError::Commit {
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
            message,
        };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| commit_error(e.to_string()))?;

        // Synchronous commit blocks on the broker round trip.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| commit_error(format!("commit task failed: {e}")))?
            .map_err(|e| commit_error(e.to_string()))
    }
}

/// Producer used for quarantine writes.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, TransportError> {
        let mut client = client_config(config);
        client.set("acks", "all");
        let producer: FutureProducer = client.create().context(ClientCreateSnafu)?;
        Ok(Self { producer })
    }

    /// Flush queued messages, waiting at most `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<(), TransportError> {
        let producer = self.producer.clone();
        let flush_error = |message: String| TransportError::Publish {
            topic: "*".to_string(),
            message,
        };
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| flush_error(format!("flush task failed: {e}")))?
            .map_err(|e| flush_error(format!("flush failed: {e}")))
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    async fn publish(&self, msg: OutboundMessage) -> Result<(), TransportError> {
        let headers = msg
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |acc, h| {
                acc.insert(rdkafka::message::Header {
                    key: &h.key,
                    value: Some(h.value.as_slice()),
                })
            });

        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&msg.topic)
            .payload(msg.payload.as_slice())
            .headers(headers);
        if !msg.key.is_empty() {
            record = record.key(&msg.key[..]);
        }

        // The caller bounds the whole write; librdkafka just queues.
        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(e, _)| TransportError::Publish {
                topic: msg.topic.clone(),
                message: e.to_string(),
            })
    }
}
