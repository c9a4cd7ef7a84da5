//! Local identity storage trait.
//!
//! Defines the local account record, its external login links and the
//! persistence operations the login orchestrator relies on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;

// =============================================================================
// External Login
// =============================================================================

/// A link between a local identity and an external provider account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalLogin {
    /// The provider (scheme) name.
    pub provider_name: String,

    /// The provider's stable subject identifier.
    pub external_subject_id: String,
}

impl ExternalLogin {
    /// Creates a new login link.
    #[must_use]
    pub fn new(provider_name: impl Into<String>, external_subject_id: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            external_subject_id: external_subject_id.into(),
        }
    }

    /// Checks if this link is for the given provider and subject.
    #[must_use]
    pub fn matches(&self, provider_name: &str, external_subject_id: &str) -> bool {
        self.provider_name == provider_name && self.external_subject_id == external_subject_id
    }
}

// =============================================================================
// Local Identity
// =============================================================================

/// A local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Unique identifier.
    pub id: String,

    /// Login name, unique per store.
    pub username: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the email address is confirmed.
    #[serde(default)]
    pub email_confirmed: bool,

    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Whether the phone number is confirmed.
    #[serde(default)]
    pub phone_confirmed: bool,

    /// Linked external logins.
    #[serde(default)]
    pub logins: Vec<ExternalLogin>,

    /// When the identity was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl LocalIdentity {
    /// Creates an identity with a fresh UUID and no contact data.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            email: None,
            email_confirmed: false,
            phone_number: None,
            phone_confirmed: false,
            logins: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the email address and its confirmation state.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>, confirmed: bool) -> Self {
        self.email = Some(email.into());
        self.email_confirmed = confirmed;
        self
    }

    /// Sets the phone number and its confirmation state.
    #[must_use]
    pub fn with_phone_number(mut self, phone: impl Into<String>, confirmed: bool) -> Self {
        self.phone_number = Some(phone.into());
        self.phone_confirmed = confirmed;
        self
    }

    /// Returns `true` if the identity has the given login linked.
    #[must_use]
    pub fn has_login(&self, provider_name: &str, external_subject_id: &str) -> bool {
        self.logins
            .iter()
            .any(|l| l.matches(provider_name, external_subject_id))
    }
}

// =============================================================================
// Identity Store Trait
// =============================================================================

/// Persistence operations for local identities.
///
/// Implementations must enforce that each (provider, subject) pair is linked
/// to at most one identity and that usernames are unique.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find the identity linked to an external login.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_external_login(
        &self,
        provider_name: &str,
        external_subject_id: &str,
    ) -> AuthResult<Option<LocalIdentity>>;

    /// Find an identity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<LocalIdentity>>;

    /// Create an identity and link `login` to it in one transaction.
    ///
    /// Either both are persisted or neither is.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the username is taken or the login is
    /// already linked, or a storage error.
    async fn create_with_login(
        &self,
        identity: &LocalIdentity,
        login: &ExternalLogin,
    ) -> AuthResult<LocalIdentity>;

    /// Link an additional external login to an existing identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` for an unknown identity,
    /// `AuthError::Conflict` if the login is linked elsewhere, or a storage error.
    async fn add_external_login(
        &self,
        identity_id: &str,
        login: &ExternalLogin,
    ) -> AuthResult<LocalIdentity>;

    /// Returns `true` if the identity is currently locked out.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_locked_out(&self, identity: &LocalIdentity) -> AuthResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_login_matches() {
        let login = ExternalLogin::new("okta", "ext-1");
        assert!(login.matches("okta", "ext-1"));
        assert!(!login.matches("okta", "ext-2"));
        assert!(!login.matches("Okta", "ext-1"));
    }

    #[test]
    fn test_identity_builder() {
        let mut identity = LocalIdentity::new("alice")
            .with_email("a@b.com", true)
            .with_phone_number("+15550100", false);
        identity.logins.push(ExternalLogin::new("okta", "ext-1"));

        assert_eq!(identity.username, "alice");
        assert!(identity.email_confirmed);
        assert!(!identity.phone_confirmed);
        assert!(identity.has_login("okta", "ext-1"));
        assert!(!identity.has_login("google", "ext-1"));
        assert!(uuid::Uuid::parse_str(&identity.id).is_ok());
    }

    #[test]
    fn test_identity_serialization() {
        let identity = LocalIdentity::new("alice").with_email("a@b.com", false);
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["email_confirmed"], false);
        assert!(json.get("phone_number").is_none());

        let back: LocalIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, identity.id);
        assert_eq!(back.email, identity.email);
    }
}
