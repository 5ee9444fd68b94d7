//! Cancellation and deadlines for plugin operations
//!
//! Every operation receives an [`OperationContext`]. The operation future is raced
//! against the context's [`CancellationToken`] and optional deadline; whichever
//! fires first drops the in-flight work and yields
//! [`PluginError::Cancelled`](crate::errors::PluginError::Cancelled).

use crate::errors::{PluginError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing token, typically a child of the host's request token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fill in `timeout` as the deadline when the caller supplied none.
    pub(crate) fn or_timeout(&self, timeout: Option<Duration>) -> Self {
        match (self.deadline, timeout) {
            (None, Some(timeout)) => self.clone().with_timeout(timeout),
            _ => self.clone(),
        }
    }

    /// Drive `future` to completion unless the token or deadline fires first.
    pub async fn run<F, T>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(PluginError::cancelled(operation, "cancelled before start"));
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, future).await {
                    Ok(result) => result,
                    Err(_) => Err(PluginError::cancelled(operation, "deadline exceeded")),
                },
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(PluginError::cancelled(operation, "cancelled by caller"))
            }
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let ctx = OperationContext::new();
        let value = ctx.run("op", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ctx = OperationContext::new();
        ctx.cancel();

        let result = ctx.run("op", async { Ok(()) }).await;
        assert!(matches!(result, Err(PluginError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_during_operation() {
        let ctx = OperationContext::new();
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = ctx
            .run("op", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(PluginError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_deadline_in_past() {
        let ctx = OperationContext::new().with_deadline(Instant::now() - Duration::from_secs(1));
        let result = ctx.run("op", std::future::pending::<Result<()>>()).await;

        match result {
            Err(PluginError::Cancelled { operation, reason }) => {
                assert_eq!(operation, "op");
                assert_eq!(reason, "deadline exceeded");
            }
            other => panic!("expected Cancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_or_timeout_keeps_caller_deadline() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let ctx = OperationContext::new().with_deadline(deadline);
        assert_eq!(ctx.or_timeout(Some(Duration::from_secs(60))).deadline(), Some(deadline));

        let ctx = OperationContext::new();
        assert!(ctx.or_timeout(None).deadline().is_none());
        assert!(ctx.or_timeout(Some(Duration::from_secs(60))).deadline().is_some());
    }
}
