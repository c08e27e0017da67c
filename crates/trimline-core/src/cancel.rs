//! Cooperative cancellation for long-running operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

struct CancelInner {
    id: Uuid,
    cancelled: AtomicBool,
    waiters: Notify,
}

/// Handle for cancelling an in-progress operation.
///
/// Clones share the same flag. Engines poll [`CancelToken::is_cancelled`]
/// between units of work; async callers can await [`CancelToken::cancelled`].
#[derive(Clone)]
pub struct CancelToken(Arc<CancelInner>);

impl CancelToken {
    /// Create a new, un-cancelled token.
    pub fn new() -> Self {
        Self(Arc::new(CancelInner {
            id: Uuid::new_v4(),
            cancelled: AtomicBool::new(false),
            waiters: Notify::new(),
        }))
    }

    /// Identity shared by all clones of this token.
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Signal cancellation and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        if !self.0.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(token = %self.0.id, "Cancellation requested");
        }
        self.0.waiters.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the token is cancelled, immediately if it already is.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.waiters.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel() is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Whether two tokens are clones of each other.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("id", &self.0.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}
