//! Tracer provider and propagator handles.
//!
//! Nothing here is installed globally: the binary creates a [`Telemetry`],
//! hands its tracer and propagator to the pipeline, and shuts it down on exit.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::config::ServiceConfig;
use crate::error::{ProviderShutdownSnafu, TelemetryError};
use crate::propagation::TracePropagator;

/// Instrumentation scope of spans emitted by this crate.
pub const TRACER_NAME: &str = "order-ingest";

pub struct Telemetry {
    provider: SdkTracerProvider,
    propagator: TracePropagator,
}

impl Telemetry {
    pub fn init(service: &ServiceConfig) -> Self {
        let resource = Resource::builder()
            .with_service_name(service.name.clone())
            .with_attribute(KeyValue::new("deployment.environment", service.env.clone()))
            .build();
        // No exporter is attached: spans still carry trace context into the
        // DLQ headers. Exporter setup belongs to the deployment, via `new`.
        let provider = SdkTracerProvider::builder().with_resource(resource).build();
        Self::new(provider, TracePropagator::default())
    }

    /// Wrap an existing provider, e.g. one with a test exporter attached.
    pub fn new(provider: SdkTracerProvider, propagator: TracePropagator) -> Self {
        Self {
            provider,
            propagator,
        }
    }

    pub fn tracer(&self) -> <SdkTracerProvider as TracerProvider>::Tracer {
        self.provider.tracer(TRACER_NAME)
    }

    pub fn propagator(&self) -> &TracePropagator {
        &self.propagator
    }

    /// Flush and stop the provider.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        if let Err(e) = self.provider.shutdown() {
            return ProviderShutdownSnafu {
                message: format!("{e:?}"),
            }
            .fail();
        }
        Ok(())
    }
}
