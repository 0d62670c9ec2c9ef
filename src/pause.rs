//! Cancellable sleeps used at every suspension point of a run.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Raised when a pause ends because the run was cancelled.
#[derive(Clone, Copy, Debug, Default, Error, Eq, PartialEq)]
#[error("run cancelled")]
pub struct Cancelled;

/// Sleeps for `duration` unless `cancel` fires first.
///
/// An already cancelled token returns immediately without sleeping.
///
/// # Errors
///
/// Returns [`Cancelled`] when the token is cancelled before the sleep ends.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        () = cancel.cancelled() => Err(Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Returns [`Cancelled`] when the token has fired; used between steps.
///
/// # Errors
///
/// Returns [`Cancelled`] when the token has been cancelled.
pub fn checkpoint(cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_for_full_duration() {
        let token = CancellationToken::new();
        let start = Instant::now();
        pause(Duration::from_secs(300), &token)
            .await
            .expect("pause should complete");
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_returns_early_when_cancelled() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        let result = pause(Duration::from_secs(300), &token).await;
        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(300));
    }

    #[tokio::test]
    async fn pause_rejects_cancelled_token_without_sleeping() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(pause(Duration::from_secs(3600), &token).await, Err(Cancelled));
        assert_eq!(checkpoint(&token), Err(Cancelled));
    }
}
