//! Order message handler: decode, validate, process under retry, quarantine.

use async_trait::async_trait;
use opentelemetry::Context;
use snafu::prelude::*;
use std::fmt::Display;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::consumer::MessageHandler;
use crate::dlq::DeadLetterForwarder;
use crate::emit;
use crate::error::{HandlerCancelledSnafu, HandlerError, ProcessError, QuarantineSnafu};
use crate::metrics::events::{
    MessageQuarantined, MessageResolved, QuarantineReason, Resolution, RetryScheduled,
};
use crate::order::{self, Order};
use crate::retry::{RetryPolicy, RetryState, Transition};
use crate::service::OrderProcessor;
use crate::transport::RawMessage;

/// Turns each order message into either a processed order or a quarantined
/// one. Only a failed quarantine or shutdown leaves the message unresolved.
pub struct OrderHandler {
    processor: Arc<dyn OrderProcessor>,
    forwarder: DeadLetterForwarder,
    policy: RetryPolicy,
}

impl OrderHandler {
    pub fn new(
        processor: Arc<dyn OrderProcessor>,
        forwarder: DeadLetterForwarder,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            processor,
            forwarder,
            policy,
        }
    }

    /// Forward `msg` to the dead-letter topic.
    ///
    /// The write is raced against shutdown; an interrupted write leaves the
    /// message unresolved so it is redelivered rather than committed.
    async fn quarantine(
        &self,
        cx: &Context,
        msg: &RawMessage,
        cause: &(dyn Display + Sync),
        retries: u32,
        reason: QuarantineReason,
        shutdown: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let Some(sent) = shutdown
            .run_until_cancelled(self.forwarder.send(cx, msg, cause, retries))
            .await
        else {
            debug!(offset = msg.offset, "Quarantine interrupted by shutdown");
            return HandlerCancelledSnafu.fail();
        };
        sent.context(QuarantineSnafu)?;
        emit!(MessageQuarantined { reason });
        emit!(MessageResolved {
            resolution: Resolution::Quarantined,
        });
        Ok(())
    }

    /// Run one downstream attempt, giving up early on shutdown.
    async fn attempt(
        &self,
        order: &Order,
        shutdown: &CancellationToken,
    ) -> Result<(), ProcessError> {
        shutdown
            .run_until_cancelled(self.processor.process_order(order))
            .await
            .unwrap_or(Err(ProcessError::Cancelled))
    }
}

#[async_trait]
impl MessageHandler for OrderHandler {
    async fn handle(
        &self,
        cx: &Context,
        msg: &RawMessage,
        shutdown: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let order = match order::decode(&msg.value) {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "Undecodable order, quarantining"
                );
                return self
                    .quarantine(cx, msg, &e, 0, QuarantineReason::Decode, shutdown)
                    .await;
            }
        };
        if let Err(e) = order::validate(&order) {
            warn!(
                order_uid = %order.order_uid,
                offset = msg.offset,
                error = %e,
                "Invalid order, quarantining"
            );
            return self
                .quarantine(cx, msg, &e, 0, QuarantineReason::Validation, shutdown)
                .await;
        }

        let mut state = RetryState::start();
        loop {
            state = match state {
                RetryState::Attempting { attempt, .. } => {
                    let outcome = self.attempt(&order, shutdown).await;
                    match self.policy.advance(attempt, outcome) {
                        Transition::Abort => return HandlerCancelledSnafu.fail(),
                        Transition::Enter {
                            state:
                                RetryState::Attempting {
                                    attempt: next,
                                    last_error,
                                },
                            delay,
                        } => {
                            if let Some(e) = &last_error {
                                warn!(
                                    order_uid = %order.order_uid,
                                    attempt,
                                    delay_ms = delay.as_millis(),
                                    error = %e,
                                    "Recoverable failure, retrying"
                                );
                            }
                            emit!(RetryScheduled { attempt, delay });
                            if shutdown
                                .run_until_cancelled(tokio::time::sleep(delay))
                                .await
                                .is_none()
                            {
                                debug!(
                                    order_uid = %order.order_uid,
                                    "Backoff interrupted by shutdown"
                                );
                                return HandlerCancelledSnafu.fail();
                            }
                            RetryState::Attempting {
                                attempt: next,
                                last_error,
                            }
                        }
                        Transition::Enter { state: next, .. } => next,
                    }
                }
                RetryState::Resolved => {
                    debug!(order_uid = %order.order_uid, offset = msg.offset, "Order processed");
                    emit!(MessageResolved {
                        resolution: Resolution::Processed,
                    });
                    return Ok(());
                }
                RetryState::Quarantined {
                    retries,
                    cause,
                    exhausted,
                } => {
                    let reason = if exhausted {
                        QuarantineReason::Exhausted
                    } else {
                        QuarantineReason::Terminal
                    };
                    warn!(
                        order_uid = %order.order_uid,
                        retries,
                        error = %cause,
                        reason = reason.as_str(),
                        "Giving up on order, quarantining"
                    );
                    return self
                        .quarantine(cx, msg, &cause, retries, reason, shutdown)
                        .await;
                }
            };
        }
    }
}
