//! TTL cache for recently stored orders.
//!
//! Expired entries are dropped lazily on read and periodically by a
//! background janitor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::emit;
use crate::error::CacheError;
use crate::metrics::events::CacheEvicted;
use crate::order::Order;

struct Entry {
    order: Order,
    expires_at: Instant,
}

/// Shared handle to the cache; clones see the same entries.
#[derive(Clone)]
pub struct OrderCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
    janitor: CancellationToken,
}

impl OrderCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            janitor: CancellationToken::new(),
        }
    }

    // A poisoned lock only means another thread panicked mid-insert; the map
    // itself is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `key`.
    ///
    /// Distinguishes a key that was never cached (`NotFound`) from one whose
    /// TTL elapsed (`Miss`); the expired entry is removed.
    pub fn get(&self, key: &str) -> Result<Order, CacheError> {
        let mut entries = self.lock();
        let Some(entry) = entries.get(key) else {
            return Err(CacheError::NotFound {
                key: key.to_string(),
            });
        };
        if Instant::now() >= entry.expires_at {
            entries.remove(key);
            return Err(CacheError::Miss {
                key: key.to_string(),
            });
        }
        Ok(entry.order.clone())
    }

    pub fn set(&self, key: impl Into<String>, order: Order) {
        let entry = Entry {
            order,
            expires_at: Instant::now() + self.ttl,
        };
        self.lock().insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Start the background sweeper. Stopped by [`close`](Self::close).
    pub fn start_janitor(&self, interval: Duration) {
        let cache = self.clone();
        let shutdown = self.janitor.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            while shutdown.run_until_cancelled(ticker.tick()).await.is_some() {
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "Cache janitor swept expired entries");
                    emit!(CacheEvicted { count: evicted });
                }
            }
            debug!("Cache janitor stopped");
        });
    }

    /// Stop the janitor. Entries stay readable.
    pub fn close(&self) {
        self.janitor.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.into(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_distinguishes_missing_and_expired() {
        let cache = OrderCache::new(Duration::from_secs(10));
        assert_eq!(
            cache.get("order:a"),
            Err(CacheError::NotFound {
                key: "order:a".into()
            })
        );

        cache.set("order:a", order("a"));
        assert_eq!(cache.get("order:a").unwrap().order_uid, "a");

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(
            cache.get("order:a"),
            Err(CacheError::Miss {
                key: "order:a".into()
            })
        );
        // Expired entry was removed on read.
        assert!(matches!(
            cache.get("order:a"),
            Err(CacheError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete() {
        let cache = OrderCache::new(Duration::from_secs(10));
        cache.set("order:a", order("a"));
        cache.delete("order:a");
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_evicts_and_stops() {
        let cache = OrderCache::new(Duration::from_secs(5));
        cache.start_janitor(Duration::from_secs(1));
        cache.set("order:a", order("a"));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(cache.is_empty());

        cache.close();
        cache.set("order:b", order("b"));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(cache.len(), 1);
    }
}
