//! In-flight request deduplication.
//!
//! Concurrent identical calls (same method, path and body) are collapsed into
//! one physical request whose outcome is shared by every caller. Each
//! registered request carries an abort handle so the UI can cancel it on
//! navigation or global teardown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{AbortHandle, Abortable, BoxFuture, Shared};
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::ApiError;

/// Handle onto an in-flight request. Cloneable and independently awaitable;
/// every clone resolves to the same `Arc` value or the same cloned error.
pub type SharedRequest = Shared<BoxFuture<'static, Result<Arc<Value>, ApiError>>>;

struct InflightRequest {
    /// Generation marker: deregistration only removes the entry it created,
    /// never a successor registered under the same key.
    id: u64,
    future: SharedRequest,
    abort: AbortHandle,
}

/// Collapses concurrent identical requests into one in-flight future.
///
/// At most one request per key is outstanding at any instant. Registration
/// happens synchronously (no await point between the lookup and the insert),
/// and deregistration happens before any waiter observes the outcome.
#[derive(Default)]
pub struct Deduplicator {
    inflight: Arc<Mutex<HashMap<String, InflightRequest>>>,
    next_id: AtomicU64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the dedup key for a request. serde_json maps serialize with
    /// sorted keys, so equal bodies always produce equal strings.
    pub fn request_key(method: &Method, path: &str, body: Option<&Value>) -> String {
        match body {
            Some(body) => format!("{} {} {}", method, path, body),
            None => format!("{} {}", method, path),
        }
    }

    /// Join the in-flight request for `key`, or start one by invoking
    /// `execute`. All waiters for a key resolve to the same `Arc` value (or
    /// the same cloned error).
    ///
    /// The future returned by `execute` is wrapped in an [`Abortable`] so
    /// [`cancel`](Self::cancel) can tear down the underlying transport call;
    /// an abort surfaces to waiters as [`ApiError::Cancelled`].
    pub fn dedupe<F, Fut>(&self, key: &str, execute: F) -> SharedRequest
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let mut inflight = self.inflight.lock().expect("dedup map poisoned");

        if let Some(existing) = inflight.get(key) {
            debug!(key, "joining in-flight request");
            return existing.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (abort, registration) = AbortHandle::new_pair();
        let map = Arc::clone(&self.inflight);
        let owned_key = key.to_string();
        let request = Abortable::new(execute(), registration);

        let future: SharedRequest = async move {
            let result = request.await;

            // Deregister before any waiter observes the outcome, success or
            // failure alike. A later request for the same key must start a
            // fresh transport call.
            {
                let mut inflight = map.lock().expect("dedup map poisoned");
                if inflight.get(&owned_key).map(|e| e.id) == Some(id) {
                    inflight.remove(&owned_key);
                }
            }

            match result {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(err)) => Err(err),
                Err(_aborted) => Err(ApiError::Cancelled),
            }
        }
        .boxed()
        .shared();

        inflight.insert(
            key.to_string(),
            InflightRequest {
                id,
                future: future.clone(),
                abort,
            },
        );

        // Drive the request to completion even if every caller drops its
        // handle mid-flight; the map entry must not outlive the request.
        tokio::spawn(future.clone().map(|_| ()));

        future
    }

    /// Abort the in-flight request for `key`, if any. Waiters observe
    /// [`ApiError::Cancelled`]; the registration is removed when the aborted
    /// future settles.
    pub fn cancel(&self, key: &str) {
        let abort = {
            let inflight = self.inflight.lock().expect("dedup map poisoned");
            inflight.get(key).map(|e| e.abort.clone())
        };
        if let Some(abort) = abort {
            debug!(key, "cancelling in-flight request");
            abort.abort();
        }
    }

    /// Abort every outstanding request. Used on global teardown and logout.
    pub fn cancel_all(&self) {
        let inflight = self.inflight.lock().expect("dedup map poisoned");
        if !inflight.is_empty() {
            debug!(count = inflight.len(), "cancelling all in-flight requests");
        }
        for entry in inflight.values() {
            entry.abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    fn counting_execute(
        calls: &Arc<AtomicUsize>,
        value: Value,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            // Hold the request open across at least one scheduling point so
            // concurrent callers can pile onto it.
            tokio::task::yield_now().await;
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execute() {
        let dedup = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            dedup.dedupe("GET /tasks", || counting_execute(&calls, json!([1, 2]))),
            dedup.dedupe("GET /tasks", || counting_execute(&calls, json!([1, 2]))),
            dedup.dedupe("GET /tasks", || counting_execute(&calls, json!([1, 2]))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let a = a.expect("first caller");
        let b = b.expect("second caller");
        let c = c.expect("third caller");
        assert!(Arc::ptr_eq(&a, &b), "waiters must share one value");
        assert!(Arc::ptr_eq(&b, &c), "waiters must share one value");
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let dedup = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.dedupe("GET /tasks", || counting_execute(&calls, json!(1))),
            dedup.dedupe("GET /vehicles", || counting_execute(&calls, json!(2))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*a.expect("tasks"), json!(1));
        assert_eq!(*b.expect("vehicles"), json!(2));
    }

    #[tokio::test]
    async fn test_errors_fan_out_to_all_waiters() {
        let dedup = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let execute = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Err(ApiError::from_status(500, r#"{"message": "boom"}"#))
            }
        };

        let (a, b) = tokio::join!(
            dedup.dedupe("GET /workers", execute),
            dedup.dedupe("GET /workers", execute),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1, "second caller must join");
        assert!(matches!(a, Err(ApiError::Http { status: 500, .. })));
        assert!(matches!(b, Err(ApiError::Http { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_settled_request_is_deregistered() {
        let dedup = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        dedup
            .dedupe("GET /tasks", || counting_execute(&calls, json!(1)))
            .await
            .expect("first round");
        assert!(dedup.inflight.lock().expect("dedup map poisoned").is_empty());

        dedup
            .dedupe("GET /tasks", || counting_execute(&calls, json!(1)))
            .await
            .expect("second round");
        assert_eq!(calls.load(Ordering::SeqCst), 2, "fresh call after settle");
    }

    #[tokio::test]
    async fn test_cancel_rejects_with_cancelled_marker() {
        let dedup = Arc::new(Deduplicator::new());

        let waiter = {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move {
                dedup
                    .dedupe("GET /machinery", || futures::future::pending())
                    .await
            })
        };

        // Let the waiter register before aborting.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        dedup.cancel("GET /machinery");

        let result = waiter.await.expect("waiter task");
        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert!(dedup.inflight.lock().expect("dedup map poisoned").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_aborts_every_key() {
        let dedup = Arc::new(Deduplicator::new());

        let spawn_waiter = |key: &'static str| {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move { dedup.dedupe(key, || futures::future::pending()).await })
        };
        let a = spawn_waiter("GET /tasks");
        let b = spawn_waiter("GET /vehicles");

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        dedup.cancel_all();

        assert!(matches!(a.await.expect("task a"), Err(ApiError::Cancelled)));
        assert!(matches!(b.await.expect("task b"), Err(ApiError::Cancelled)));
    }

    #[test]
    fn test_request_key_includes_method_path_and_body() {
        let no_body = Deduplicator::request_key(&Method::GET, "/tasks", None);
        assert_eq!(no_body, "GET /tasks");

        let body = json!({"title": "oil change", "assigneeId": 4});
        let with_body = Deduplicator::request_key(&Method::POST, "/tasks", Some(&body));
        assert!(with_body.starts_with("POST /tasks "));

        // Maps serialize with sorted keys, so an equal body built in a
        // different order produces the same key.
        let reordered = json!({"assigneeId": 4, "title": "oil change"});
        assert_eq!(
            with_body,
            Deduplicator::request_key(&Method::POST, "/tasks", Some(&reordered))
        );
    }
}
