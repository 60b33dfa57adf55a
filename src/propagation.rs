//! Trace-context propagation through message headers.
//!
//! Consumed messages continue the trace their producer started: the
//! [`TracePropagator`] extracts the remote span context from headers on the
//! way in and injects the active context into headers on the way out.

use opentelemetry::Context;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use std::fmt;
use std::sync::Arc;

use crate::transport::Header;

/// Read-only view of message headers for extraction.
pub struct HeaderExtractor<'a>(pub &'a [Header]);

impl Extractor for HeaderExtractor<'_> {
    /// First header named `key` whose value is valid UTF-8.
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .filter(|h| h.key == key)
            .find_map(|h| std::str::from_utf8(&h.value).ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|h| h.key.as_str()).collect()
    }
}

/// Mutable view of message headers for injection.
///
/// Setting an existing key replaces its value so a republished message never
/// carries two conflicting `traceparent` entries.
pub struct HeaderInjector<'a>(pub &'a mut Vec<Header>);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        match self.0.iter_mut().find(|h| h.key == key) {
            Some(existing) => existing.value = value.into_bytes(),
            None => self.0.push(Header::new(key, value)),
        }
    }
}

/// Handle over a text-map propagator, passed explicitly to whoever needs it.
#[derive(Clone)]
pub struct TracePropagator {
    inner: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl TracePropagator {
    pub fn new(inner: impl TextMapPropagator + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Derive the message-scoped parent context from `headers`.
    ///
    /// Missing or malformed trace headers yield an empty context, so the
    /// consumer span becomes a new root.
    pub fn extract(&self, headers: &[Header]) -> Context {
        self.inner.extract(&HeaderExtractor(headers))
    }

    /// Write `cx` into `headers`.
    pub fn inject(&self, cx: &Context, headers: &mut Vec<Header>) {
        self.inner.inject_context(cx, &mut HeaderInjector(headers));
    }
}

impl Default for TracePropagator {
    /// W3C trace context plus baggage.
    fn default() -> Self {
        Self::new(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]))
    }
}

impl fmt::Debug for TracePropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracePropagator")
            .field("fields", &self.inner.fields().collect::<Vec<_>>())
            .finish()
    }
}
