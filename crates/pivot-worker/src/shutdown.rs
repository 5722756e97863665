//! Cooperative shutdown signal shared by the listener and the executor pool.

use tokio::sync::watch;

/// Shutdown sender and receiver; `true` means stop.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once shutdown is requested or the sender is gone.
pub async fn requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Non-blocking check.
pub fn is_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_requested_resolves_on_signal() {
        let (tx, mut rx) = channel();
        assert!(!is_requested(&rx));

        let waiter = tokio::spawn(async move { requested(&mut rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = channel();
        drop(tx);
        assert!(is_requested(&rx));
        tokio::time::timeout(Duration::from_secs(1), requested(&mut rx))
            .await
            .unwrap();
    }
}
