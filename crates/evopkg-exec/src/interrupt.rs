//! Cooperative cancellation shared by every in-flight dispatch

use std::sync::Arc;

use tokio::sync::watch;

/// Interrupt flag shared between the signal handler and dispatchers
///
/// Once triggered it stays triggered for the rest of the process.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    /// Create an untriggered interrupt
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation of all in-flight commands
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_trigger_wakes_waiters() {
        let interrupt = Interrupt::new();
        let waiter = interrupt.clone();
        let handle = tokio::spawn(async move { waiter.triggered().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!interrupt.is_triggered());
        interrupt.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(interrupt.is_triggered());
    }

    #[tokio::test]
    async fn test_already_triggered_resolves_immediately() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        tokio::time::timeout(Duration::from_millis(100), interrupt.triggered())
            .await
            .unwrap();
    }
}
