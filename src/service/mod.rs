//! Downstream order processing: persistence plus cache population.

mod cache;
mod repository;

pub use cache::OrderCache;
pub use repository::{InMemoryRepository, OrderRepository};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ProcessError;
use crate::order::{Order, cache_key};

/// Accepts a validated order. Must tolerate being called again with the same
/// order, since a retry may follow an ambiguous partial success.
#[async_trait]
pub trait OrderProcessor: Send + Sync {
    async fn process_order(&self, order: &Order) -> Result<(), ProcessError>;
}

/// Default bound on one repository write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Stores orders and keeps the read cache warm.
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    cache: OrderCache,
    write_timeout: Duration,
}

impl OrderService {
    pub fn new(repository: Arc<dyn OrderRepository>, cache: OrderCache) -> Self {
        Self {
            repository,
            cache,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }
}

#[async_trait]
impl OrderProcessor for OrderService {
    async fn process_order(&self, order: &Order) -> Result<(), ProcessError> {
        tokio::time::timeout(self.write_timeout, self.repository.upsert(order))
            .await
            .map_err(|_| ProcessError::Timeout {
                message: format!("upsert exceeded {:?}", self.write_timeout),
            })??;

        self.cache.set(cache_key(&order.order_uid), order.clone());
        debug!(order_uid = %order.order_uid, "Order stored");
        Ok(())
    }
}
