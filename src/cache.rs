//! TTL Cache (C2), per `spec.md` §4.2 and §5.
//!
//! Keyed, time-bounded memoization of read results with single-flight
//! deduplication: concurrent misses on the same key observe a single
//! upstream fetch. Sharded (minimum 16 shards) so unrelated keys never
//! contend on one lock.

use std::any::Any;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, RwLock};

const MIN_SHARDS: usize = 16;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

type AnyValue = Arc<dyn Any + Send + Sync>;

enum Slot {
    Fresh { value: AnyValue, inserted_at: Instant },
    /// A fetch for this key is in flight; waiters subscribe to `notify`.
    InFlight { notify: Arc<Notify> },
}

struct Shard {
    entries: HashMap<String, Slot>,
}

/// Keyed, sharded, single-flight TTL cache.
///
/// Values are type-erased so one cache instance can back heterogeneous
/// collectors (`spec.md` §4.2: "Cache is shared by all collectors, keyed
/// by `(kind, namespace[, name])`"). `get_or_fetch` is the only way to
/// populate a key; `set` is available for callers that already hold a
/// fresh value (`spec.md` §4.2: "On `Set`, overwrites unconditionally").
pub struct TtlCache {
    shards: Vec<RwLock<Shard>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_shards(ttl, MIN_SHARDS)
    }

    pub fn with_shards(ttl: Duration, shard_count: usize) -> Self {
        let shard_count = shard_count.max(MIN_SHARDS);
        let shards = (0..shard_count)
            .map(|_| {
                RwLock::new(Shard {
                    entries: HashMap::new(),
                })
            })
            .collect();
        Self { shards, ttl }
    }

    fn shard_for(&self, key: &str) -> &RwLock<Shard> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Unconditionally overwrite `key` with a fresh value.
    pub async fn set<V: Send + Sync + 'static>(&self, key: &str, value: V) {
        let shard = self.shard_for(key);
        let mut guard = shard.write().await;
        let waiters = match guard.entries.remove(key) {
            Some(Slot::InFlight { notify }) => Some(notify),
            _ => None,
        };
        guard.entries.insert(
            key.to_string(),
            Slot::Fresh {
                value: Arc::new(value),
                inserted_at: Instant::now(),
            },
        );
        drop(guard);
        if let Some(notify) = waiters {
            notify.notify_waiters();
        }
    }

    /// Read `key` if present and not stale; does not trigger a fetch.
    pub async fn get<V: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<V> {
        let shard = self.shard_for(key);
        let guard = shard.read().await;
        match guard.entries.get(key) {
            Some(Slot::Fresh { value, inserted_at }) if inserted_at.elapsed() < self.ttl => {
                value.downcast_ref::<V>().cloned()
            }
            _ => None,
        }
    }

    /// Get `key`, or fetch it via `fetch` on a stale/empty entry.
    ///
    /// Single-flight: if a fetch for `key` is already in flight, this call
    /// waits on the same fetch's result instead of invoking `fetch` again
    /// (`spec.md` invariant 5, scenario S6).
    pub async fn get_or_fetch<V, F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        loop {
            let shard = self.shard_for(key);
            let notify_to_await = {
                let mut guard = shard.write().await;
                match guard.entries.get(key) {
                    Some(Slot::Fresh { value, inserted_at })
                        if inserted_at.elapsed() < self.ttl =>
                    {
                        if let Some(v) = value.downcast_ref::<V>().cloned() {
                            return Ok(v);
                        }
                        None
                    }
                    Some(Slot::InFlight { notify }) => Some(notify.clone()),
                    _ => {
                        guard.entries.insert(
                            key.to_string(),
                            Slot::InFlight {
                                notify: Arc::new(Notify::new()),
                            },
                        );
                        None
                    }
                }
            };

            if let Some(notify) = notify_to_await {
                notify.notified().await;
                continue;
            }

            // We just claimed the InFlight slot: we are the single fetcher.
            let result = fetch().await;
            match result {
                Ok(value) => {
                    self.set(key, value.clone()).await;
                    return Ok(value);
                }
                Err(err) => {
                    // Clear the InFlight marker so a later call can retry;
                    // wake anyone waiting so they re-enter the loop and
                    // retry their own fetch rather than hanging forever.
                    let mut guard = shard.write().await;
                    if let Some(Slot::InFlight { notify }) = guard.entries.remove(key) {
                        notify.notify_waiters();
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = TtlCache::new(StdDuration::from_secs(60));
        cache.set("pods/default", 42u32).await;
        let value: Option<u32> = cache.get("pods/default").await;
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn stale_entry_is_absent() {
        let cache = TtlCache::new(StdDuration::from_millis(10));
        cache.set("pods/default", 7u32).await;
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        let value: Option<u32> = cache.get("pods/default").await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn get_or_fetch_populates_on_miss() {
        let cache = TtlCache::new(StdDuration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let value: Result<u32, ()> = cache
            .get_or_fetch("key", || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(99)
            })
            .await;
        assert_eq!(value, Ok(99));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_flight_calls_upstream_once() {
        let cache = Arc::new(TtlCache::new(StdDuration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch::<u32, _, _, ()>("shared-key", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(20)).await;
                        Ok(5)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(5));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_does_not_poison_the_key() {
        let cache = TtlCache::new(StdDuration::from_secs(60));
        let first: Result<u32, &str> = cache.get_or_fetch("k", || async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));

        let second: Result<u32, &str> = cache.get_or_fetch("k", || async { Ok(1) }).await;
        assert_eq!(second, Ok(1));
    }

    #[test]
    fn cache_has_at_least_sixteen_shards() {
        let cache = TtlCache::with_shards(StdDuration::from_secs(60), 1);
        assert!(cache.shards.len() >= MIN_SHARDS);
    }
}
