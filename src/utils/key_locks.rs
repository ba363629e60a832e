use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutexes, one per key.
///
/// Idle entries expire, so the table only holds keys seen recently. An entry
/// evicted while held only weakens serialisation to what the store's
/// conditional writes already guarantee.
pub struct KeyLocks<K> {
    locks: Cache<K, Arc<Mutex<()>>>,
}

impl<K> KeyLocks<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(max_keys: u64, idle: Duration) -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(max_keys)
                .time_to_idle(idle)
                .build(),
        }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .get_with(key, async { Arc::new(Mutex::new(())) })
            .await;
        mutex.lock_owned().await
    }
}
