//! Queue transport abstraction.
//!
//! The consumer depends only on [`MessageSource`] (fetch one, commit one) and
//! the dead-letter forwarder only on [`MessagePublisher`], so both can be
//! driven by scripted doubles in tests. [`kafka`] provides the rdkafka-backed
//! implementations.

pub mod kafka;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::TransportError;

pub use kafka::{KafkaPublisher, KafkaSource};

/// A single message header. Keys may repeat; order is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A message as fetched from the source topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Bytes,
    pub value: Bytes,
    pub headers: Vec<Header>,
    /// Producer or broker timestamp, when the broker reports one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawMessage {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: Bytes::new(),
            value: value.into(),
            headers: Vec::new(),
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_slice())
    }
}

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Empty means "no key".
    pub key: Bytes,
    pub payload: Vec<u8>,
    pub headers: Vec<Header>,
}

impl OutboundMessage {
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_slice())
    }
}

/// Fetch-one/commit-one access to the source topic.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message.
    ///
    /// Callers race this against their shutdown token; implementations only
    /// need to be cancel-safe.
    async fn fetch(&self) -> Result<RawMessage, TransportError>;

    /// Mark `msg` as fully resolved.
    async fn commit(&self, msg: &RawMessage) -> Result<(), TransportError>;
}

/// Publish access to an output topic.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish one message and wait for the broker acknowledgement.
    async fn publish(&self, msg: OutboundMessage) -> Result<(), TransportError>;
}
