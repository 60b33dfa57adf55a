//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use opentelemetry::trace::Tracer;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use order_ingest::consumer::Consumer;
use order_ingest::dlq::DeadLetterForwarder;
use order_ingest::error::{ProcessError, TransportError};
use order_ingest::order::Order;
use order_ingest::pipeline::{OrderHandler, Pipeline};
use order_ingest::propagation::TracePropagator;
use order_ingest::retry::RetryPolicy;
use order_ingest::service::OrderProcessor;
use order_ingest::transport::{MessagePublisher, MessageSource, OutboundMessage, RawMessage};

/// Replays a fixed script of fetch results. Once the script is exhausted it
/// cancels `shutdown` and blocks, like an idle broker during shutdown.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<RawMessage, TransportError>>>,
    committed: Mutex<Vec<RawMessage>>,
    shutdown: CancellationToken,
}

impl ScriptedSource {
    pub fn new(
        script: Vec<Result<RawMessage, TransportError>>,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            committed: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
        }
    }

    pub fn committed_offsets(&self) -> Vec<i64> {
        self.committed.lock().unwrap().iter().map(|m| m.offset).collect()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch(&self) -> Result<RawMessage, TransportError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(item) => item,
            None => {
                self.shutdown.cancel();
                std::future::pending().await
            }
        }
    }

    async fn commit(&self, msg: &RawMessage) -> Result<(), TransportError> {
        self.committed.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// Records every published message; optionally fails or stalls every publish.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
    delay: Duration,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Each publish takes `delay` before it is recorded.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, msg: OutboundMessage) -> Result<(), TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(TransportError::Publish {
                topic: msg.topic,
                message: "leader not available".into(),
            });
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

/// Returns scripted outcomes in order, then `fallback` forever.
pub struct ScriptedProcessor {
    outcomes: Mutex<VecDeque<Result<(), ProcessError>>>,
    fallback: Result<(), ProcessError>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedProcessor {
    pub fn new(
        outcomes: Vec<Result<(), ProcessError>>,
        fallback: Result<(), ProcessError>,
    ) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: Result<(), ProcessError>) -> Self {
        Self::new(Vec::new(), outcome)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Time between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl OrderProcessor for ScriptedProcessor {
    async fn process_order(&self, _order: &Order) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push(Instant::now());
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Never finishes an attempt; counts how many were started.
#[derive(Default)]
pub struct StalledProcessor {
    calls: AtomicUsize,
}

impl StalledProcessor {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderProcessor for StalledProcessor {
    async fn process_order(&self, _order: &Order) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

pub fn unavailable() -> ProcessError {
    ProcessError::Unavailable {
        message: "connection refused".into(),
    }
}

pub fn rejected() -> ProcessError {
    ProcessError::Rejected {
        message: "duplicate key violates unique constraint".into(),
    }
}

pub const DLQ_TOPIC: &str = "orders.dlq";

/// Pipeline over scripted doubles, with a fast retry policy.
pub fn pipeline<P, T>(
    source: ScriptedSource,
    processor: Arc<P>,
    publisher: Arc<RecordingPublisher>,
    tracer: T,
) -> Pipeline<ScriptedSource, T>
where
    P: OrderProcessor + 'static,
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    let propagator = TracePropagator::default();
    let forwarder = DeadLetterForwarder::new(publisher, DLQ_TOPIC, propagator.clone());
    let handler = OrderHandler::new(processor, forwarder, policy());
    Pipeline::new(Consumer::new(source, tracer, propagator), handler)
}

pub fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(250))
}

/// A complete, valid order document.
pub fn order_json(order_uid: &str) -> Value {
    json!({
        "order_uid": order_uid,
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": order_uid,
            "request": "req-1",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": 453,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 30,
            "size": "0",
            "total_price": 317,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": 202
        }],
        "locale": "en",
        "internal_signature": "sig",
        "customer_id": "test",
        "delivery_service": "meest",
        "shard_key": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "off_shard": "1"
    })
}

pub fn order_message(offset: i64, body: &Value) -> RawMessage {
    RawMessage::new("orders", 0, offset, body.to_string().into_bytes())
}
