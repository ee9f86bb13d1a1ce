//! Reconnect policy.
//!
//! The engine never retries on its own; the supervisor asks the policy how
//! long to wait before the next attempt.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Fixed-delay reconnect policy.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the configured delay.
    ///
    /// Returns `false` if `shutdown` fired first, meaning no reconnect
    /// should happen.
    pub async fn wait(&self, shutdown: &CancellationToken) -> bool {
        if shutdown.is_cancelled() {
            return false;
        }
        warn!(delay_secs = self.delay.as_secs_f64(), "Reconnecting after delay");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_elapses() {
        let policy = ReconnectPolicy::new(Duration::from_millis(5));
        assert!(policy.wait(&CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn shutdown_interrupts_wait() {
        let policy = ReconnectPolicy::new(Duration::from_secs(3600));
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        assert!(!policy.wait(&token).await);
    }

    #[tokio::test]
    async fn already_stopped() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!ReconnectPolicy::default().wait(&token).await);
    }
}
