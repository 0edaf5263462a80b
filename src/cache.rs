use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry<T> {
    value: Arc<T>,
    loaded_at: Instant,
}

/// Loaded data shared between sessions, reloaded after `ttl`
///
/// Failed loads are not cached, so the next request retries the source.
pub struct DataCache<T> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T> DataCache<T> {
    pub fn new(ttl: Duration) -> Self {
        DataCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached value for `key`, or the result of `load` if none is fresh
    pub async fn get_or_try_load<F, Fut>(&self, key: &str, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.value));
                }
            }
        }

        log::info!("loading data for {}", key);
        let value = Arc::new(load().await?);

        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Arc::clone(&value),
                loaded_at: Instant::now(),
            },
        );
        Ok(value)
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
