//! In-memory identity store.
//!
//! All indexes live behind one lock so that creating an identity together
//! with its first login is a single atomic step.

use std::collections::HashMap;

use async_trait::async_trait;
use fedgate_auth::storage::{ExternalLogin, IdentityStore, LocalIdentity};
use fedgate_auth::{AuthError, AuthResult};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct IdentityState {
    identities: HashMap<String, LocalIdentity>,
    /// (provider, subject) -> identity id
    logins: HashMap<ExternalLogin, String>,
    /// normalized username -> identity id
    usernames: HashMap<String, String>,
    /// identity id -> lockout end
    lockouts: HashMap<String, OffsetDateTime>,
}

/// Identities, login links and lockouts kept in process memory.
///
/// Usernames are unique case-insensitively.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    state: RwLock<IdentityState>,
}

impl InMemoryIdentityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities.
    pub async fn len(&self) -> usize {
        self.state.read().await.identities.len()
    }

    /// Returns `true` if there are no identities.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.identities.is_empty()
    }

    /// Finds an identity by username.
    pub async fn find_by_username(&self, username: &str) -> Option<LocalIdentity> {
        let state = self.state.read().await;
        state
            .usernames
            .get(&normalize(username))
            .and_then(|id| state.identities.get(id))
            .cloned()
    }

    /// Locks `identity_id` out until `until`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` for an unknown identity.
    pub async fn lock_out(&self, identity_id: &str, until: OffsetDateTime) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if !state.identities.contains_key(identity_id) {
            return Err(AuthError::not_found("identity", identity_id));
        }
        state.lockouts.insert(identity_id.to_string(), until);
        tracing::debug!(identity_id = %identity_id, until = %until, "Identity locked out");
        Ok(())
    }

    /// Lifts a lockout. Returns `true` if one was set.
    pub async fn unlock(&self, identity_id: &str) -> bool {
        self.state.write().await.lockouts.remove(identity_id).is_some()
    }
}

fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_external_login(
        &self,
        provider_name: &str,
        external_subject_id: &str,
    ) -> AuthResult<Option<LocalIdentity>> {
        let key = ExternalLogin::new(provider_name, external_subject_id);
        let state = self.state.read().await;
        Ok(state
            .logins
            .get(&key)
            .and_then(|id| state.identities.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<LocalIdentity>> {
        Ok(self.state.read().await.identities.get(id).cloned())
    }

    async fn create_with_login(
        &self,
        identity: &LocalIdentity,
        login: &ExternalLogin,
    ) -> AuthResult<LocalIdentity> {
        let username = normalize(&identity.username);
        if username.is_empty() {
            return Err(AuthError::validation("username is required"));
        }

        let mut state = self.state.write().await;
        if state.identities.contains_key(&identity.id) {
            return Err(AuthError::conflict(
                &identity.id,
                format!("identity {} already exists", identity.id),
            ));
        }
        if state.usernames.contains_key(&username) {
            return Err(AuthError::conflict(
                &identity.username,
                format!("username '{}' is already taken", identity.username),
            ));
        }
        if state.logins.contains_key(login) {
            return Err(AuthError::conflict(
                &login.provider_name,
                format!(
                    "external login {}:{} is already linked",
                    login.provider_name, login.external_subject_id
                ),
            ));
        }

        let mut created = identity.clone();
        if !created.has_login(&login.provider_name, &login.external_subject_id) {
            created.logins.push(login.clone());
        }
        for linked in &created.logins {
            state.logins.insert(linked.clone(), created.id.clone());
        }
        state.usernames.insert(username, created.id.clone());
        state.identities.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn add_external_login(
        &self,
        identity_id: &str,
        login: &ExternalLogin,
    ) -> AuthResult<LocalIdentity> {
        let mut state = self.state.write().await;
        if let Some(owner) = state.logins.get(login) {
            if owner == identity_id {
                return state
                    .identities
                    .get(identity_id)
                    .cloned()
                    .ok_or_else(|| AuthError::not_found("identity", identity_id));
            }
            return Err(AuthError::conflict(
                &login.provider_name,
                format!(
                    "external login {}:{} is linked to another identity",
                    login.provider_name, login.external_subject_id
                ),
            ));
        }

        let identity = state
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| AuthError::not_found("identity", identity_id))?;
        identity.logins.push(login.clone());
        let updated = identity.clone();
        state.logins.insert(login.clone(), identity_id.to_string());
        Ok(updated)
    }

    async fn is_locked_out(&self, identity: &LocalIdentity) -> AuthResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .lockouts
            .get(&identity.id)
            .is_some_and(|until| *until > OffsetDateTime::now_utc()))
    }
}
