use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Clonable one-shot stop signal shared by watchers and dispatcher workers.
///
/// Every clone observes the same state. Cancelling is idempotent.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation to every clone.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not lost.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn test_cancel_after_waiter_registered_wakes_it() {
        let token = ShutdownToken::new();
        let waiter = token.cancelled();
        tokio::pin!(waiter);
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        token.clone().cancel();
        assert!(futures::poll!(waiter.as_mut()).is_ready());
    }

    #[test]
    fn test_already_cancelled_token_resolves_immediately() {
        let token = ShutdownToken::default();
        assert!(token.cancelled().now_or_never().is_none());

        token.cancel();
        token.cancel();
        assert!(token.cancelled().now_or_never().is_some());
    }
}
