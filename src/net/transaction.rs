//! Cancellation handle for one dispatched request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Shared flag the front-end flips when the client goes away.
///
/// Clones observe the same state. [`Transaction::cancelled`] resolves once
/// [`Transaction::cancel`] has been called on any clone.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

#[derive(Debug, Default)]
struct TransactionInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Cancels the transaction when dropped unless disarmed first.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            transaction: Some(self.clone()),
        }
    }
}

#[derive(Debug)]
pub struct CancelOnDrop {
    transaction: Option<Transaction>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.transaction = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(transaction) = self.transaction.take() {
            transaction.cancel();
        }
    }
}
