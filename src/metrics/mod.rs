//! Metrics for order-ingest.
//!
//! - `events`: the `InternalEvent` trait and one struct per measurable occurrence
//! - `server`: Prometheus recorder and the `/metrics` + `/health` endpoint

pub mod events;
pub mod server;

pub use server::init;

/// Emit an [`events::InternalEvent`], recording its metric.
///
/// ```ignore
/// use order_ingest::metrics::events::{MessageConsumed, OffsetCommitted};
///
/// emit!(MessageConsumed { topic: "orders".into() });
/// emit!(OffsetCommitted { partition: 0 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
