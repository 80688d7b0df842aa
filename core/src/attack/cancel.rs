//! Cooperative cancellation signal shared by a scan and its probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::select_all;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Flag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Flag {
    fn is_set(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    async fn wait(self: Arc<Self>) {
        loop {
            // Registered before the check so a concurrent `set` cannot slip between.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Clonable cancellation handle.
///
/// A signal created with [`CancelSignal::child`] fires when it is cancelled
/// itself or when any of its ancestors is; cancelling a child never touches
/// its parent.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    // chain[0] is this signal's own flag, the rest are ancestors.
    chain: Vec<Arc<Flag>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            chain: vec![Arc::new(Flag::default())],
        }
    }

    pub fn child(&self) -> Self {
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(Arc::new(Flag::default()));
        chain.extend(self.chain.iter().cloned());
        Self { chain }
    }

    pub fn cancel(&self) {
        self.chain[0].set();
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|flag| flag.is_set())
    }

    /// Resolves once this signal or an ancestor is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let waits = self
            .chain
            .iter()
            .map(|flag| Box::pin(Arc::clone(flag).wait()));
        select_all(waits).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
