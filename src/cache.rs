//! Time-bounded memoization of upstream responses.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;

/// A TTL cache. Stale entries are only replaced by the next `put` for the
/// same key; there is no background sweep and no capacity bound.
pub struct Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<K, (V, DateTime<Utc>)>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.lock().await;
        match cache.get(key) {
            Some((value, expires_at)) if *expires_at > self.clock.now() => {
                debug!("Cache HIT");
                Some(value.clone())
            }
            Some(_) => {
                debug!("Cache STALE");
                None
            }
            None => {
                debug!("Cache MISS");
                None
            }
        }
    }

    pub async fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT");
        cache.insert(key, (value, self.clock.now() + self.ttl));
    }
}
