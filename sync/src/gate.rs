//! Cooperative priority gate between queries and background indexing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// OPEN/HELD gate that de-prioritizes background work while a query runs.
///
/// A query holds the gate for its duration via [`Gate::hold`]; pipeline
/// workers call [`Gate::wait_open`] before picking up their next item and
/// never mid-item. The gate is a throughput mechanism only — it does not
/// make index mutation safe, the single commit owner does.
#[derive(Clone, Default)]
pub struct Gate {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    holds: AtomicUsize,
    notify: Notify,
}

impl Gate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate; it reopens when the returned guard (and every other
    /// outstanding guard) is dropped.
    pub fn hold(&self) -> HoldGuard {
        self.shared.holds.fetch_add(1, Ordering::SeqCst);
        HoldGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// True while at least one guard is outstanding.
    pub fn is_held(&self) -> bool {
        self.shared.holds.load(Ordering::SeqCst) > 0
    }

    /// Wait until no guard is outstanding.
    ///
    /// Returns immediately when the gate is open. The wakeup future is
    /// registered before the state re-check, so a release between the check
    /// and the await cannot be missed.
    pub async fn wait_open(&self) {
        loop {
            let reopened = self.shared.notify.notified();
            if self.shared.holds.load(Ordering::SeqCst) == 0 {
                return;
            }
            reopened.await;
        }
    }
}

/// RAII guard returned by [`Gate::hold`]; dropping it releases the hold.
pub struct HoldGuard {
    shared: Arc<Shared>,
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        if self.shared.holds.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.notify.notify_waiters();
        }
    }
}
