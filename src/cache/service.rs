//! TTL request cache with miss-fill coalescing.
//!
//! One process-wide instance sits between the typed data-access functions and
//! the deduplicator. Keys are opaque strings (the request path), values are
//! the parsed JSON bodies shared as `Arc<Value>`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::api::ApiError;

/// TTL for frequently-mutated collections (tasks, notifications).
/// 10s keeps the dashboard close to live without hammering the backend.
pub const TTL_SHORT: Duration = Duration::from_secs(10);

/// TTL for moderately stable views (vehicles, machinery, dashboard stats).
pub const TTL_MEDIUM: Duration = Duration::from_secs(30);

/// TTL for near-static reference data (organizations, workers, users).
pub const TTL_LONG: Duration = Duration::from_secs(300);

type SharedFill = Shared<BoxFuture<'static, Result<Arc<Value>, ApiError>>>;

struct CacheEntry {
    value: Arc<Value>,
    expires_at: Instant,
}

struct PendingFill {
    /// Generation marker: an invalidated fill must not remove or repopulate
    /// state owned by a successor registered under the same key.
    id: u64,
    future: SharedFill,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    pending: HashMap<String, PendingFill>,
}

impl CacheInner {
    /// Return the entry for `key` if it is still fresh; purge it otherwise.
    /// Expiry check and removal happen in the same locked section, so a stale
    /// value can never be observed.
    fn fresh_value(&mut self, key: &str) -> Option<Arc<Value>> {
        let expired = match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                return Some(Arc::clone(&entry.value));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!(key, "cache entry expired");
            self.entries.remove(key);
        }
        None
    }
}

/// Process-wide TTL cache.
///
/// Both maps live behind one mutex so that a cache read, the pending-fill
/// lookup and a new fill registration form a single atomic step under real
/// threads. The mutex is never held across an await point.
#[derive(Default)]
pub struct CacheService {
    inner: Arc<Mutex<CacheInner>>,
    next_fill_id: AtomicU64,
}

impl CacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a cached value. Expired entries behave as a miss and are removed.
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        self.inner.lock().expect("cache poisoned").fresh_value(key)
    }

    /// Store a value under `key` for `ttl`.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let mut inner = self.inner.lock().expect("cache poisoned");
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::new(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove exactly one entry, along with any pending fill for it. A fill
    /// that was mid-flight still resolves to its waiters, but its result is
    /// discarded instead of repopulating the cache.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache poisoned");
        inner.entries.remove(key);
        inner.pending.remove(key);
    }

    /// Remove every entry (and pending fill) whose key contains `pattern`.
    ///
    /// Substring matching over opaque keys is deliberate: a resource family
    /// shares a URL prefix, so one call after a mutation evicts the whole
    /// family. Note this is O(n) over all keys and matches `/tasks` inside a
    /// hypothetical `/tasks-archive` too.
    pub fn invalidate_pattern(&self, pattern: &str) {
        let mut inner = self.inner.lock().expect("cache poisoned");
        let before = inner.entries.len() + inner.pending.len();
        inner.entries.retain(|key, _| !key.contains(pattern));
        inner.pending.retain(|key, _| !key.contains(pattern));
        let evicted = before - (inner.entries.len() + inner.pending.len());
        if evicted > 0 {
            debug!(pattern, evicted, "cache invalidated by pattern");
        }
    }

    /// Drop everything, entries and pending fills alike.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache poisoned");
        inner.entries.clear();
        inner.pending.clear();
    }

    /// Cache-aware fetch.
    ///
    /// With `use_cache` set: a fresh entry is returned as-is; a miss joins the
    /// pending fill for the key if one exists, otherwise registers a new fill
    /// around `execute`. Two concurrent misses for one key therefore cost one
    /// `execute` invocation.
    ///
    /// With `use_cache` unset: both the read and the pending registry are
    /// bypassed and `execute` runs directly, forcing an authoritative read
    /// (the deduplicator underneath still coalesces identical transport
    /// calls). The result is not stored.
    pub async fn cached_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        use_cache: bool,
        execute: F,
    ) -> Result<Arc<Value>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Value>, ApiError>> + Send + 'static,
    {
        if !use_cache {
            return execute().await;
        }

        let fill = {
            let mut inner = self.inner.lock().expect("cache poisoned");

            if let Some(value) = inner.fresh_value(key) {
                return Ok(value);
            }

            if let Some(pending) = inner.pending.get(key) {
                debug!(key, "joining pending cache fill");
                pending.future.clone()
            } else {
                let id = self.next_fill_id.fetch_add(1, Ordering::Relaxed);
                let map = Arc::clone(&self.inner);
                let owned_key = key.to_string();
                let request = execute();

                let future: SharedFill = async move {
                    let result = request.await;

                    let mut inner = map.lock().expect("cache poisoned");
                    let current = inner.pending.get(&owned_key).map(|f| f.id) == Some(id);
                    if current {
                        inner.pending.remove(&owned_key);
                    }

                    match result {
                        Ok(value) => {
                            if current {
                                inner.entries.insert(
                                    owned_key,
                                    CacheEntry {
                                        value: Arc::clone(&value),
                                        expires_at: Instant::now() + ttl,
                                    },
                                );
                            }
                            // An invalidated fill resolves its waiters but
                            // must not repopulate the cache.
                            Ok(value)
                        }
                        Err(err) => Err(err),
                    }
                }
                .boxed()
                .shared();

                inner.pending.insert(
                    key.to_string(),
                    PendingFill {
                        id,
                        future: future.clone(),
                    },
                );

                // Keep the fill running even if every waiter goes away.
                tokio::spawn(future.clone().map(|_| ()));

                future
            }
        };

        fill.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    fn counting_fill(
        calls: &Arc<AtomicUsize>,
        value: Value,
    ) -> impl Future<Output = Result<Arc<Value>, ApiError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Arc::new(value))
        }
    }

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let cache = CacheService::new();
        cache.set("/tasks", json!([1, 2, 3]), TTL_SHORT);
        let value = cache.get("/tasks").expect("fresh entry");
        assert_eq!(*value, json!([1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_and_is_purged() {
        let cache = CacheService::new();
        cache.set("/tasks", json!("a"), Duration::from_millis(100));
        assert!(cache.get("/tasks").is_some());

        tokio::time::advance(Duration::from_millis(150)).await;

        assert!(cache.get("/tasks").is_none());
        // The read that found the entry expired must have removed it.
        assert!(cache
            .inner
            .lock()
            .expect("cache poisoned")
            .entries
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_pattern_evicts_family_only() {
        let cache = CacheService::new();
        cache.set("/tasks", json!("a"), TTL_SHORT);
        cache.set("/tasks/my", json!("b"), TTL_SHORT);
        cache.set("/vehicles", json!("c"), TTL_SHORT);

        cache.invalidate_pattern("/tasks");

        assert!(cache.get("/tasks").is_none());
        assert!(cache.get("/tasks/my").is_none());
        assert!(cache.get("/vehicles").is_some());
    }

    #[tokio::test]
    async fn test_cold_concurrent_fetches_share_one_fill() {
        let cache = CacheService::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.cached_fetch("/vehicles", TTL_MEDIUM, true, || counting_fill(
                &calls,
                json!(["v1"])
            )),
            cache.cached_fetch("/vehicles", TTL_MEDIUM, true, || counting_fill(
                &calls,
                json!(["v1"])
            )),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let a = a.expect("first caller");
        let b = b.expect("second caller");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_repeat_fetch_within_ttl_hits_cache() {
        let cache = CacheService::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .cached_fetch("/vehicles", TTL_MEDIUM, true, || {
                counting_fill(&calls, json!(["v1", "v2"]))
            })
            .await
            .expect("cold fetch");

        let second = cache
            .cached_fetch("/vehicles", TTL_MEDIUM, true, || {
                counting_fill(&calls, json!(["v1", "v2"]))
            })
            .await
            .expect("warm fetch");

        assert_eq!(calls.load(Ordering::SeqCst), 1, "one network hit");
        assert!(Arc::ptr_eq(&first, &second), "same shared value both times");
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_read_and_store() {
        let cache = CacheService::new();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.set("/tasks", json!("stale"), TTL_SHORT);

        let value = cache
            .cached_fetch("/tasks", TTL_SHORT, false, || {
                counting_fill(&calls, json!("fresh"))
            })
            .await
            .expect("bypass fetch");

        assert_eq!(calls.load(Ordering::SeqCst), 1, "must not serve the cache");
        assert_eq!(*value, json!("fresh"));
        // The authoritative read does not overwrite the cached entry either.
        assert_eq!(*cache.get("/tasks").expect("entry kept"), json!("stale"));
    }

    #[tokio::test]
    async fn test_invalidated_fill_resolves_but_does_not_repopulate() {
        let cache = Arc::new(CacheService::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let fill = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .cached_fetch("/workers", TTL_LONG, true, move || async move {
                        release_rx.await.expect("release signal");
                        Ok(Arc::new(json!(["w1"])))
                    })
                    .await
            })
        };

        // Let the fill register, then invalidate while it is mid-flight.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        cache.invalidate("/workers");
        release_tx.send(()).expect("fill still listening");

        let value = fill.await.expect("fill task").expect("fill result");
        assert_eq!(*value, json!(["w1"]), "waiters still get the result");
        assert!(
            cache.get("/workers").is_none(),
            "invalidated fill must not repopulate the cache"
        );
    }

    #[tokio::test]
    async fn test_failed_fill_is_deregistered() {
        let cache = CacheService::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .cached_fetch("/stats", TTL_MEDIUM, true, || async {
                tokio::task::yield_now().await;
                Err(ApiError::from_status(503, "unavailable"))
            })
            .await;
        assert!(first.is_err());

        // The failed fill must not stay registered: a retry runs execute again.
        let second = cache
            .cached_fetch("/stats", TTL_MEDIUM, true, || {
                counting_fill(&calls, json!({"openTasks": 3}))
            })
            .await
            .expect("retry succeeds");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((*second)["openTasks"], 3);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = CacheService::new();
        cache.set("/tasks", json!("a"), TTL_SHORT);
        cache.set("/vehicles", json!("b"), TTL_MEDIUM);

        cache.clear();

        assert!(cache.get("/tasks").is_none());
        assert!(cache.get("/vehicles").is_none());
    }
}
