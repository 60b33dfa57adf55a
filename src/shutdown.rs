//! Ordered teardown of long-lived resources.
//!
//! Resources register a named close function as they are created. On
//! shutdown [`Closer::close_all`] runs every close function concurrently
//! (started newest first) and waits for them up to a deadline.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::ShutdownError;

type CloseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

#[derive(Default)]
pub struct Closer {
    entries: Mutex<Vec<(String, CloseFn)>>,
    closed: AtomicBool,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `close` under `name`.
    pub fn add<F, Fut, E>(&self, name: impl Into<String>, close: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        let name = name.into();
        if self.closed.load(Ordering::Acquire) {
            warn!(resource = %name, "Closer already ran; resource will not be closed");
            return;
        }
        let close: CloseFn =
            Box::new(move || Box::pin(async move { close().await.map_err(|e| e.to_string()) }));
        self.lock().push((name, close));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, CloseFn)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Close everything registered so far. Later calls are no-ops.
    ///
    /// Returns the first close error, or a timeout naming the resources that
    /// had not finished when `timeout` elapsed.
    pub async fn close_all(&self, timeout: Duration) -> Result<(), ShutdownError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let entries = std::mem::take(&mut *self.lock());
        if entries.is_empty() {
            return Ok(());
        }

        let mut pending: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
        let mut running: FuturesUnordered<_> = entries
            .into_iter()
            .rev()
            .map(|(name, close)| async move {
                let started = Instant::now();
                let result = close().await;
                (name, started.elapsed(), result)
            })
            .collect();

        let mut first_error = None;
        let drain = async {
            while let Some((name, elapsed, result)) = running.next().await {
                pending.retain(|p| p != &name);
                match result {
                    Ok(()) => info!(resource = %name, elapsed_ms = elapsed.as_millis(), "Closed"),
                    Err(message) => {
                        error!(
                            resource = %name,
                            elapsed_ms = elapsed.as_millis(),
                            error = %message,
                            "Close failed"
                        );
                        first_error.get_or_insert(ShutdownError::CloseFailed { name, message });
                    }
                }
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(?pending, timeout_ms = timeout.as_millis(), "Shutdown deadline exceeded");
            return Err(ShutdownError::ShutdownTimeout { timeout, pending });
        }
        first_error.map_or(Ok(()), Err)
    }
}
