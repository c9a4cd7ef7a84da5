//! In-memory session issuer.

use async_trait::async_trait;
use fedgate_auth::AuthResult;
use fedgate_auth::storage::{LocalIdentity, Session, SessionIssuer};
use tokio::sync::RwLock;

/// Records every session it starts.
#[derive(Debug, Default)]
pub struct InMemorySessionIssuer {
    sessions: RwLock<Vec<Session>>,
}

impl InMemorySessionIssuer {
    /// Creates an issuer with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// All sessions started so far, oldest first.
    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions.read().await.clone()
    }

    /// Sessions started for `subject`.
    pub async fn sessions_for(&self, subject: &str) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionIssuer for InMemorySessionIssuer {
    async fn start_session(
        &self,
        identity: &LocalIdentity,
        persistent: bool,
    ) -> AuthResult<Session> {
        let session = Session::for_identity(identity, persistent);
        self.sessions.write().await.push(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_recorded() {
        let issuer = InMemorySessionIssuer::new();
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");

        issuer.start_session(&alice, false).await.unwrap();
        issuer.start_session(&bob, true).await.unwrap();
        issuer.start_session(&alice, true).await.unwrap();

        assert_eq!(issuer.sessions().await.len(), 3);
        let for_alice = issuer.sessions_for(&alice.id).await;
        assert_eq!(for_alice.len(), 2);
        assert!(!for_alice[0].persistent);
        assert!(for_alice[1].persistent);
    }
}
