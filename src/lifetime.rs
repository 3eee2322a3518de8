//! Process lifetime signal.
//!
//! `Lifetime` is held by whoever owns shutdown; `Shutdown` is the read side
//! handed to the collector loop and to probes. Once stopped, a lifetime
//! never returns to running.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Lifetime {
    tx: Arc<watch::Sender<bool>>,
}

impl Lifetime {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Begin shutdown. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_stopping(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has begun, or when the owning `Lifetime` is gone.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopping| *stopping).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_wakes_subscribers() {
        let lifetime = Lifetime::new();
        let mut shutdown = lifetime.subscribe();
        assert!(!shutdown.is_stopping());

        let waiter = tokio::spawn(async move {
            shutdown.stopped().await;
            shutdown.is_stopping()
        });
        lifetime.stop();

        let stopped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_stop() {
        let lifetime = Lifetime::new();
        lifetime.stop();
        lifetime.stop();
        let mut shutdown = lifetime.subscribe();
        assert!(shutdown.is_stopping());
        shutdown.stopped().await;
    }
}
