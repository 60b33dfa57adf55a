//! Order domain model, decoding and validation.

mod decode;
mod model;

pub use decode::{decode, validate};
pub use model::{Delivery, Item, Order, Payment};

/// Cache key under which a stored order is kept.
pub fn cache_key(order_uid: &str) -> String {
    format!("order:{order_uid}")
}
