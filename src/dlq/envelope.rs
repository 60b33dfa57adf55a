//! Dead-letter envelope wire format.
//!
//! The envelope is self-contained: the original message's bytes are kept as
//! base64 so quarantine tooling can reproduce the payload byte for byte.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::RawMessage;

/// JSON body of a quarantined message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Message of the error that made the original unprocessable.
    pub reason: String,
    /// Retries performed before quarantine.
    pub retries: u32,
    #[serde(with = "rfc3339_nanos")]
    pub failed_at: DateTime<Utc>,
    pub original: OriginalMessage,
}

/// Copy of the message that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_b64: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_b64: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<EnvelopeHeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub key: String,
    pub value_b64: String,
}

impl DlqEnvelope {
    pub fn new(
        msg: &RawMessage,
        reason: impl Into<String>,
        retries: u32,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reason: reason.into(),
            retries,
            failed_at,
            original: OriginalMessage {
                topic: msg.topic.clone(),
                partition: msg.partition,
                offset: msg.offset,
                time: msg.timestamp,
                key_b64: STANDARD.encode(&msg.key),
                value_b64: STANDARD.encode(&msg.value),
                headers: msg
                    .headers
                    .iter()
                    .map(|h| EnvelopeHeader {
                        key: h.key.clone(),
                        value_b64: STANDARD.encode(&h.value),
                    })
                    .collect(),
            },
        }
    }
}

impl OriginalMessage {
    pub fn key(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.key_b64)
    }

    pub fn value(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.value_b64)
    }
}

/// Timestamp with nanosecond precision and a `Z` suffix, as also used for
/// the `x-failed-at` header.
pub fn format_failed_at(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

mod rfc3339_nanos {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_failed_at(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}
