//! In-memory map of one-shot dispatch entries, keyed by re-schedule id.
//!
//! The map is the single point of admission: scheduling an id that is
//! already present is a no-op, which is what keeps a job from being
//! dispatched twice when the scan tick fires faster than the status
//! transition lands. The lock guards only map reads and writes; timers
//! and workflows run on their own tasks and never hold it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Cooperative cancellation flag handed to a running workflow.
///
/// A workflow checks it between poll passes; it is never interrupted
/// mid-call.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct DispatchEntry {
    handle: JoinHandle<()>,
    started: Arc<AtomicBool>,
    cancel: CancelFlag,
}

#[derive(Default)]
pub struct DispatchMap {
    entries: Mutex<HashMap<i32, DispatchEntry>>,
}

impl DispatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a one-shot dispatch for `id` at `run_at`.
    ///
    /// Returns false without side effects when an entry for the id
    /// already exists. The delay is computed against the supplied `now`
    /// so callers keep control of the clock.
    pub fn schedule<F, Fut>(
        &self,
        id: i32,
        run_at: DateTime<Utc>,
        now: DateTime<Utc>,
        run: F,
    ) -> bool
    where
        F: FnOnce(CancelFlag) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            debug!("Dispatch entry for re-schedule {} already exists", id);
            return false;
        }

        let started = Arc::new(AtomicBool::new(false));
        let cancel = CancelFlag::default();
        let delay = (run_at - now).to_std().unwrap_or_default();

        let task_started = started.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if task_cancel.is_cancelled() {
                return;
            }
            task_started.store(true, Ordering::SeqCst);
            run(task_cancel).await;
        });

        entries.insert(
            id,
            DispatchEntry {
                handle,
                started,
                cancel,
            },
        );
        debug!("Dispatch entry for re-schedule {} registered at {}", id, run_at);
        true
    }

    /// Cancel and remove the entry for `id`.
    ///
    /// A dispatch still waiting on its timer is aborted outright; one
    /// whose workflow already started only receives the cooperative flag
    /// and runs to its next checkpoint.
    pub fn cancel(&self, id: i32) {
        let entry = self.entries.lock().remove(&id);
        if let Some(entry) = entry {
            entry.cancel.cancel();
            if !entry.started.load(Ordering::SeqCst) {
                entry.handle.abort();
            }
            debug!("Dispatch entry for re-schedule {} cancelled", id);
        }
    }

    /// Drop the entry once its job reached a terminal status
    pub fn remove(&self, id: i32) {
        self.entries.lock().remove(&id);
    }

    pub fn contains(&self, id: i32) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn flag() -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        (Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn past_run_at_executes_promptly() {
        let map = DispatchMap::new();
        let (ran, _) = flag();
        let ran_clone = ran.clone();

        let now = Utc::now();
        assert!(map.schedule(1, now - chrono::Duration::hours(1), now, move |_| async move {
            ran_clone.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn second_schedule_for_same_id_is_a_noop() {
        let map = DispatchMap::new();
        let now = Utc::now();
        let later = now + chrono::Duration::hours(1);

        assert!(map.schedule(7, later, now, |_| async {}));
        assert!(!map.schedule(7, later, now, |_| async {
            panic!("duplicate dispatch must never run");
        }));
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn cancel_before_timer_fires_prevents_the_run() {
        let map = DispatchMap::new();
        let (ran, _) = flag();
        let ran_clone = ran.clone();

        let now = Utc::now();
        map.schedule(3, now + chrono::Duration::milliseconds(100), now, move |_| async move {
            ran_clone.store(true, Ordering::SeqCst);
        });
        map.cancel(3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(!map.contains(3));
    }

    #[tokio::test]
    async fn cancel_of_running_workflow_sets_the_flag_only() {
        let map = DispatchMap::new();
        let (observed, finished) = flag();
        let observed_clone = observed.clone();
        let finished_clone = finished.clone();

        let now = Utc::now();
        map.schedule(5, now, now, move |cancel| async move {
            // emulate a workflow polling its cancellation checkpoint
            for _ in 0..20 {
                if cancel.is_cancelled() {
                    observed_clone.store(true, Ordering::SeqCst);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            finished_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        map.cancel(5);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(observed.load(Ordering::SeqCst));
        assert!(finished.load(Ordering::SeqCst), "workflow ran to completion");
    }

    #[tokio::test]
    async fn remove_allows_a_fresh_dispatch() {
        let map = DispatchMap::new();
        let now = Utc::now();
        let later = now + chrono::Duration::hours(1);

        assert!(map.schedule(9, later, now, |_| async {}));
        map.remove(9);
        assert!(map.schedule(9, later, now, |_| async {}));
    }
}
