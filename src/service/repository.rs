//! Order persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::order::Order;

/// Store of orders keyed by `order_uid`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert or replace the order. Writing the same order twice is a no-op.
    async fn upsert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get(&self, order_uid: &str) -> Result<Order, RepositoryError>;
}

/// Process-local repository, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryRepository {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepository {
    async fn upsert(&self, order: &Order) -> Result<(), RepositoryError> {
        self.orders
            .write()
            .await
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Order, RepositoryError> {
        self.orders
            .read()
            .await
            .get(order_uid)
            .cloned()
            .ok_or_else(|| RepositoryError::OrderNotFound {
                order_uid: order_uid.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let repo = InMemoryRepository::new();
        let order = Order {
            order_uid: "o-1".into(),
            ..Default::default()
        };
        repo.upsert(&order).await.unwrap();
        repo.upsert(&order).await.unwrap();
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.get("o-1").await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.get("nope").await,
            Err(RepositoryError::OrderNotFound { .. })
        ));
    }
}
