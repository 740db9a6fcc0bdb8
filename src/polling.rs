//! Polling coordinator for timer-driven data refresh.
//!
//! Dashboard views keep themselves fresh by re-running a fetch on a fixed
//! interval. The coordinator guarantees that cycles never overlap, that a
//! tick landing during a fetch is skipped rather than queued, and that
//! teardown mid-flight discards the outcome instead of reporting it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::api::ApiError;

struct PollingShared {
    stopped: AtomicBool,
    fetching: AtomicBool,
    refresh: Notify,
    stop: Notify,
}

/// Handle to a running polling session.
///
/// Dropping the handle stops the session: teardown is a first-class
/// operation, not an ambient flag. To re-register with new parameters, drop
/// the old handle and call [`start_polling`] again.
pub struct PollingHandle {
    shared: Arc<PollingShared>,
    task: tokio::task::JoinHandle<()>,
}

impl PollingHandle {
    /// Force an immediate out-of-band fetch. Skipped (not queued) if a fetch
    /// is already in flight.
    pub fn refresh(&self) {
        if self.shared.fetching.load(Ordering::SeqCst) {
            debug!("refresh skipped, fetch already in flight");
            return;
        }
        self.shared.refresh.notify_one();
    }

    /// Stop the session. The timer is torn down at the next await point; an
    /// in-flight fetch is not cancelled, but its result is discarded.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.stop.notify_one();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start polling `fetch` every `period`, with one immediate fetch up front.
///
/// At most one invocation of `fetch` is outstanding at any instant; interval
/// ticks that land while a fetch is running are skipped entirely. Errors are
/// passed to `on_error` exactly once per failed cycle, except cancellation
/// markers, which are swallowed. There is no retry beyond the next tick.
pub fn start_polling<F, Fut, E>(mut fetch: F, period: Duration, on_error: E) -> PollingHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
    E: Fn(anyhow::Error) + Send + 'static,
{
    let shared = Arc::new(PollingShared {
        stopped: AtomicBool::new(false),
        fetching: AtomicBool::new(false),
        refresh: Notify::new(),
        stop: Notify::new(),
    });

    let state = Arc::clone(&shared);
    let task = tokio::spawn(async move {
        // First tick only after a full period; the first fetch below runs
        // immediately. Skip keeps missed ticks from bursting after a slow
        // fetch.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if state.stopped.load(Ordering::SeqCst) {
                break;
            }

            state.fetching.store(true, Ordering::SeqCst);
            let result = fetch().await;
            state.fetching.store(false, Ordering::SeqCst);

            if state.stopped.load(Ordering::SeqCst) {
                // Torn down while the fetch was in flight: the outcome is
                // nobody's business anymore.
                break;
            }

            match result {
                Ok(()) => {}
                Err(err) if ApiError::is_cancellation(&err) => {
                    debug!("fetch cancelled, skipping cycle");
                }
                Err(err) => on_error(err),
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = state.refresh.notified() => {
                    debug!("manual refresh requested");
                }
                _ = state.stop.notified() => break,
            }
        }
        debug!("polling session stopped");
    });

    PollingHandle { shared, task }
}
