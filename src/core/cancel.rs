//! Cooperative cancellation
//!
//! Wraps the host's shutdown `watch` channel. Waits race the signal and stop
//! early; submission loops only call [`CancelToken::check`] between records so
//! an in-flight write is never abandoned.

use crate::domain::{Result, SyncError};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    signal: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that never fires
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_receiver(signal: watch::Receiver<bool>) -> Self {
        Self {
            signal: Some(signal),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fail with [`SyncError::Cancelled`] if the signal has fired
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled(format!("{operation} interrupted")));
        }
        Ok(())
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration, operation: &str) -> Result<()> {
        self.check(operation)?;
        let Some(signal) = &self.signal else {
            tokio::time::sleep(duration).await;
            return Ok(());
        };

        let mut signal = signal.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = wait_for_cancel(&mut signal) => {
                Err(SyncError::Cancelled(format!("{operation} interrupted")))
            }
        }
    }
}

async fn wait_for_cancel(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            // Sender gone: nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_none_never_cancels() {
        let token = CancelToken::none();
        assert!(!token.is_cancelled());
        assert!(token.sleep(Duration::from_millis(1), "wait").await.is_ok());
    }

    #[tokio::test]
    async fn test_sleep_aborts_on_signal() {
        let (tx, rx) = watch::channel(false);
        let token = CancelToken::from_receiver(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let result = token.sleep(Duration::from_secs(30), "polling").await;
        assert!(matches!(result, Err(SyncError::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_check_after_signal() {
        let (tx, rx) = watch::channel(false);
        let token = CancelToken::from_receiver(rx);
        assert!(token.check("submit").is_ok());
        tx.send(true).unwrap();
        assert!(token.check("submit").is_err());
    }
}
