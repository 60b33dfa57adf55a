//! Retry/backoff policy for downstream processing.
//!
//! Processing one order is a small state machine:
//!
//! ```text
//! Attempting(n) --ok-----------------------------> Resolved
//! Attempting(n) --recoverable, n - 1 < max-------> Attempting(n + 1)   (after backoff)
//! Attempting(n) --terminal | exhausted-----------> Quarantined
//! Attempting(n) --cancelled----------------------> abort
//! ```
//!
//! [`RetryPolicy::advance`] computes transitions without sleeping so the
//! classification can be tested apart from timing; the pipeline drives the
//! sleeps.

use std::time::Duration;

use crate::error::ProcessError;

/// Bounds and backoff curve for retrying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    max: Duration,
}

impl Default for RetryPolicy {
    /// Five retries, 200ms doubling up to 5s.
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200), Duration::from_secs(5))
    }
}

/// Where processing of a message stands.
#[derive(Debug, Clone)]
pub enum RetryState {
    /// About to make attempt number `attempt` (1-based).
    Attempting {
        attempt: u32,
        /// Error from the previous attempt, if any.
        last_error: Option<ProcessError>,
    },
    /// Downstream accepted the order.
    Resolved,
    /// Give up and hand the message to the dead-letter forwarder.
    Quarantined {
        /// Retries actually performed before giving up.
        retries: u32,
        /// Last error observed.
        cause: ProcessError,
        /// Whether the retry budget ran out (as opposed to a terminal error).
        exhausted: bool,
    },
}

impl RetryState {
    /// Initial state for a freshly decoded message.
    pub fn start() -> Self {
        RetryState::Attempting {
            attempt: 1,
            last_error: None,
        }
    }
}

/// Result of feeding one attempt outcome into the policy.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Move to `state`. `delay` is non-zero only when entering a retry.
    Enter { state: RetryState, delay: Duration },
    /// Shutdown interrupted the attempt; drop the sequence without quarantine.
    Abort,
}

impl Transition {
    fn now(state: RetryState) -> Self {
        Transition::Enter {
            state,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            base,
            max: max.max(base),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry `k` (1-based): `base * 2^(k-1)`, capped at the ceiling.
    pub fn backoff(&self, k: u32) -> Duration {
        let exp = k.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Next state after `attempt` (1-based) finished with `outcome`.
    pub fn advance(&self, attempt: u32, outcome: Result<(), ProcessError>) -> Transition {
        let err = match outcome {
            Ok(()) => return Transition::now(RetryState::Resolved),
            Err(err) => err,
        };
        if err.is_cancelled() {
            return Transition::Abort;
        }

        let retries = attempt.saturating_sub(1);
        if !err.is_recoverable() || retries >= self.max_retries {
            return Transition::now(RetryState::Quarantined {
                retries,
                exhausted: err.is_recoverable(),
                cause: err,
            });
        }

        Transition::Enter {
            state: RetryState::Attempting {
                attempt: attempt + 1,
                last_error: Some(err),
            },
            delay: self.backoff(attempt),
        }
    }
}
