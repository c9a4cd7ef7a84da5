//! Per-request context shared by every core operation.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;

/// Inbound request data that handlers and stores need.
///
/// Cloning is cheap; clones share the same cancellation token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Public origin of the gateway (scheme, host, port), used to build
    /// absolute redirect URIs from callback paths.
    pub origin: Url,

    /// Correlation id for log lines belonging to this request.
    pub request_id: String,

    /// Cancelled when the inbound request goes away.
    pub cancellation: CancellationToken,
}

impl RequestContext {
    /// Creates a context for the given public origin with a fresh token.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            request_id: uuid::Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Uses an existing cancellation token (e.g. one tied to the connection).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with `AuthError::Cancelled` if the request is already cancelled.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cancelled` when the token has fired.
    pub fn ensure_active(&self) -> AuthResult<()> {
        if self.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        Ok(())
    }

    /// Awaits `fut` unless the request is cancelled first.
    ///
    /// The future is dropped on cancellation, so it must not leave partial
    /// state behind when dropped mid-flight.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cancelled`, or whatever `fut` returns.
    pub async fn run<T, F>(&self, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(AuthError::Cancelled),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new(Url::parse("https://login.example.com").unwrap())
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = ctx();
        let value = ctx.run(async { Ok::<_, AuthError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_cancelled_before_start() {
        let ctx = ctx();
        ctx.cancellation.cancel();
        let result = ctx
            .run(async { Ok::<_, AuthError>("never observed") })
            .await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert!(ctx.ensure_active().is_err());
    }

    #[tokio::test]
    async fn test_run_cancelled_while_pending() {
        let ctx = ctx();
        let token = ctx.cancellation.clone();
        tokio::spawn(async move { token.cancel() });
        let result = ctx
            .run(std::future::pending::<AuthResult<()>>())
            .await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }

    #[test]
    fn test_clones_share_token() {
        let ctx = ctx().with_request_id("req-1");
        let clone = ctx.clone();
        ctx.cancellation.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.request_id, "req-1");
    }
}
