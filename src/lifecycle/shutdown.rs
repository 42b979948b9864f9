//! Shutdown coordination for the proxy.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

/// Time allowed for in-flight requests to finish after shutdown starts.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `task` to completion, or give up `deadline` after shutdown starts.
    ///
    /// Returns `None` when the deadline cut the task short.
    pub async fn drain<F: Future>(&self, task: F, deadline: Duration) -> Option<F::Output> {
        let mut rx = self.subscribe();
        let expired = async move {
            let _ = rx.recv().await;
            tokio::time::sleep(deadline).await;
        };

        tokio::select! {
            output = task => Some(output),
            _ = expired => {
                tracing::warn!(deadline = ?deadline, "Drain deadline passed, abandoning in-flight work");
                None
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_trigger() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.clone().trigger();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_deadline() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        let result = shutdown
            .drain(std::future::pending::<()>(), Duration::from_secs(1))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn drain_returns_finished_task() {
        let shutdown = Shutdown::new();
        let result = shutdown.drain(async { 7 }, Duration::from_secs(1)).await;
        assert_eq!(result, Some(7));
    }
}
