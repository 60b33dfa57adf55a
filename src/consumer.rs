//! Sequential fetch → handle → commit loop.
//!
//! Each message is handled under a `kafka.consume` span whose parent is the
//! trace context extracted from the message headers. The offset is committed
//! only after the handler reports the message resolved; a handler error stops
//! the loop with the message uncommitted, so it is redelivered on restart.

use async_trait::async_trait;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use snafu::prelude::*;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::emit;
use crate::error::{ConsumerCommitSnafu, ConsumerError, ConsumerFetchSnafu, HandlerError};
use crate::metrics::events::{MessageConsumed, MessageHandled, OffsetCommitted};
use crate::propagation::TracePropagator;
use crate::transport::{MessageSource, RawMessage};

/// Name of the per-message consumer span.
pub const CONSUME_SPAN: &str = "kafka.consume";

/// Resolves one message.
///
/// `Ok` means the message is done with (processed or quarantined) and its
/// offset may be committed.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        cx: &Context,
        msg: &RawMessage,
        shutdown: &CancellationToken,
    ) -> Result<(), HandlerError>;
}

pub struct Consumer<S, T> {
    source: S,
    tracer: T,
    propagator: TracePropagator,
}

impl<S, T> Consumer<S, T>
where
    S: MessageSource,
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    pub fn new(source: S, tracer: T, propagator: TracePropagator) -> Self {
        Self {
            source,
            tracer,
            propagator,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Consume until shutdown or the first unrecoverable error.
    ///
    /// Never returns `Ok`: shutdown surfaces as [`ConsumerError::Cancelled`],
    /// which callers should treat as a clean stop.
    pub async fn read<H>(
        &self,
        shutdown: &CancellationToken,
        handler: &H,
    ) -> Result<(), ConsumerError>
    where
        H: MessageHandler + ?Sized,
    {
        loop {
            let msg = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested while waiting for messages");
                    return Err(ConsumerError::Cancelled);
                }

                fetched = self.source.fetch() => fetched.context(ConsumerFetchSnafu)?,
            };

            self.consume_one(shutdown, handler, &msg).await?;
        }
    }

    async fn consume_one<H>(
        &self,
        shutdown: &CancellationToken,
        handler: &H,
        msg: &RawMessage,
    ) -> Result<(), ConsumerError>
    where
        H: MessageHandler + ?Sized,
    {
        let started = Instant::now();
        emit!(MessageConsumed {
            topic: msg.topic.clone(),
        });

        let parent = self.propagator.extract(&msg.headers);
        let builder = self
            .tracer
            .span_builder(CONSUME_SPAN)
            .with_kind(SpanKind::Consumer)
            .with_attributes([
                KeyValue::new("messaging.system", "kafka"),
                KeyValue::new("messaging.destination", msg.topic.clone()),
                KeyValue::new("messaging.kafka.partition", i64::from(msg.partition)),
                KeyValue::new("messaging.kafka.offset", msg.offset),
            ]);
        let span = self.tracer.build_with_context(builder, &parent);
        let cx = parent.with_span(span);

        let outcome = handler.handle(&cx, msg, shutdown).await;

        let span = cx.span();
        if let Err(err) = outcome {
            span.record_error(&err);
            span.set_status(Status::error(err.to_string()));
            span.end();

            if err.is_cancelled() {
                info!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    "Message left uncommitted on shutdown"
                );
                return Err(ConsumerError::Cancelled);
            }
            error!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %err,
                "Message handler failed; offset not committed"
            );
            return Err(ConsumerError::Handler { source: err });
        }
        span.set_status(Status::Ok);
        span.end();

        self.source.commit(msg).await.context(ConsumerCommitSnafu)?;
        emit!(OffsetCommitted {
            partition: msg.partition,
        });
        emit!(MessageHandled {
            duration: started.elapsed(),
        });
        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "Offset committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DlqError, TransportError};
    use opentelemetry::trace::noop::NoopTracer;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a script, then cancels `shutdown` and waits forever.
    struct Scripted {
        script: Mutex<VecDeque<Result<RawMessage, TransportError>>>,
        committed: Mutex<Vec<i64>>,
        fail_commit: bool,
        shutdown: CancellationToken,
    }

    impl Scripted {
        fn new(
            script: Vec<Result<RawMessage, TransportError>>,
            shutdown: &CancellationToken,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                committed: Mutex::new(Vec::new()),
                fail_commit: false,
                shutdown: shutdown.clone(),
            }
        }
    }

    #[async_trait]
    impl MessageSource for Scripted {
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
            if self.fail_commit {
                return Err(TransportError::Commit {
                    topic: msg.topic.clone(),
                    partition: msg.partition,
                    offset: msg.offset,
                    message: "not coordinator".into(),
                });
            }
            self.committed.lock().unwrap().push(msg.offset);
            Ok(())
        }
    }

    struct Accept;

    #[async_trait]
    impl MessageHandler for Accept {
        async fn handle(
            &self,
            _cx: &Context,
            _msg: &RawMessage,
            _shutdown: &CancellationToken,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct Reject;

    #[async_trait]
    impl MessageHandler for Reject {
        async fn handle(
            &self,
            _cx: &Context,
            _msg: &RawMessage,
            _shutdown: &CancellationToken,
        ) -> Result<(), HandlerError> {
            Err(HandlerError::Quarantine {
                source: DlqError::DlqTimeout {
                    timeout: Duration::from_secs(5),
                },
            })
        }
    }

    fn msg(offset: i64) -> RawMessage {
        RawMessage::new("orders", 0, offset, &b"{}"[..])
    }

    fn consumer(source: Scripted) -> Consumer<Scripted, NoopTracer> {
        Consumer::new(source, NoopTracer::new(), TracePropagator::default())
    }

    #[tokio::test]
    async fn test_commits_each_resolved_message_once() {
        let shutdown = CancellationToken::new();
        let c = consumer(Scripted::new(vec![Ok(msg(1)), Ok(msg(2))], &shutdown));

        let err = c.read(&shutdown, &Accept).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*c.source().committed.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_handler_error_stops_without_commit() {
        let shutdown = CancellationToken::new();
        let c = consumer(Scripted::new(vec![Ok(msg(1)), Ok(msg(2))], &shutdown));

        let err = c.read(&shutdown, &Reject).await.unwrap_err();
        assert!(matches!(err, ConsumerError::Handler { .. }));
        assert!(c.source().committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces() {
        let shutdown = CancellationToken::new();
        let c = consumer(Scripted::new(
            vec![
                Ok(msg(1)),
                Err(TransportError::Fetch {
                    message: "broker transport failure".into(),
                }),
            ],
            &shutdown,
        ));

        let err = c.read(&shutdown, &Accept).await.unwrap_err();
        assert!(matches!(err, ConsumerError::ConsumerFetch { .. }));
        assert_eq!(*c.source().committed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_commit_error_surfaces() {
        let shutdown = CancellationToken::new();
        let mut source = Scripted::new(vec![Ok(msg(1)), Ok(msg(2))], &shutdown);
        source.fail_commit = true;
        let c = consumer(source);

        let err = c.read(&shutdown, &Accept).await.unwrap_err();
        assert!(matches!(err, ConsumerError::ConsumerCommit { .. }));
        assert_eq!(c.source().script.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_immediately() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let c = consumer(Scripted::new(vec![Ok(msg(1))], &shutdown));

        let err = c.read(&shutdown, &Accept).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(c.source().committed.lock().unwrap().is_empty());
    }
}
