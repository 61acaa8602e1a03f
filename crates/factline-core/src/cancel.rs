use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation signal shared between a top-level context (the
/// server, or a rollup run) and the background workers it owns.
///
/// Cloning shares the same underlying flag; any clone can cancel, and any
/// clone can observe or await cancellation.
#[derive(Clone)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, otherwise waits for `cancel()`.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiter() {
        let c = Cancellation::new();
        let waiter = c.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        c.cancel();
        handle.await.unwrap();
        assert!(c.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let c = Cancellation::new();
        c.cancel();
        c.cancelled().await;
    }
}
