//! Session issuance trait.
//!
//! The session itself (cookie, token, server-side record) is owned by the
//! surrounding authentication server. The core only asks for one to be started
//! once an external login resolves to a local identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::storage::LocalIdentity;

/// A local session started for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: String,

    /// Subject of the session (the identity id).
    pub subject: String,

    /// Username at the time the session was issued.
    pub username: String,

    /// Whether the session survives browser restarts.
    pub persistent: bool,

    /// When the session was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl Session {
    /// Creates a session keyed by the identity's id and username.
    #[must_use]
    pub fn for_identity(identity: &LocalIdentity, persistent: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject: identity.id.clone(),
            username: identity.username.clone(),
            persistent,
            issued_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Starts local sessions.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    /// Start a session for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be recorded.
    async fn start_session(&self, identity: &LocalIdentity, persistent: bool)
    -> AuthResult<Session>;
}
