//! External login orchestration.
//!
//! [`ExternalLoginService`] drives a login through a scheme's handler and
//! resolves the external assertion to a local identity:
//!
//! ```text
//! challenge ──► provider ──► callback ──► ExternalLoginResult
//!                                               │
//!                          find_by_external_login(provider, subject)
//!                         ┌─────────────┴──────────────┐
//!                      matched                      unmatched
//!                 ┌──────┴──────┐         ┌────────────┼─────────────┐
//!              SignedIn     LockedOut  Unsupported  AutoProvisioned  NeedsConfirmation
//!                                      (denylist)   (auto_provision)   (ticket)
//! ```
//!
//! Unconfirmed registrations are held server-side and redeemed with
//! [`ExternalLoginService::confirm_pending_registration`].

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::claims::ExternalLoginResult;
use super::handler::{CallbackPayload, ChallengeRedirect};
use super::handler_provider::HandlerProvider;
use super::scheme::SchemeResolver;
use crate::AuthResult;
use crate::config::FederationConfig;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::storage::{ExternalLogin, IdentityStore, LocalIdentity, Session, SessionIssuer};

// =============================================================================
// Outcomes
// =============================================================================

/// How an external login ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// An existing identity was signed in.
    SignedIn {
        /// The started session.
        session: Session,
        /// Where to send the user next.
        #[serde(skip_serializing_if = "Option::is_none")]
        return_url: Option<String>,
    },

    /// A new identity was created and signed in.
    AutoProvisioned {
        /// The started session.
        session: Session,
        /// Where to send the user next.
        #[serde(skip_serializing_if = "Option::is_none")]
        return_url: Option<String>,
    },

    /// The matched identity is locked out; no session was started.
    LockedOut {
        /// The locked identity.
        identity_id: String,
    },

    /// The user must confirm a registration before an account is created.
    NeedsConfirmation {
        /// The pending registration to present.
        registration: PendingRegistration,
    },

    /// The provider may not create accounts.
    Unsupported {
        /// The provider name.
        provider: String,
    },
}

impl LoginOutcome {
    /// The session, if one was started.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn { session, .. } | Self::AutoProvisioned { session, .. } => {
                Some(session)
            }
            _ => None,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn { .. } => "signed_in",
            Self::AutoProvisioned { .. } => "auto_provisioned",
            Self::LockedOut { .. } => "locked_out",
            Self::NeedsConfirmation { .. } => "needs_confirmation",
            Self::Unsupported { .. } => "unsupported",
        }
    }
}

/// An external login awaiting the user's choice of username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRegistration {
    /// Opaque ticket redeemed on confirmation.
    pub ticket: String,

    /// The provider that asserted the login.
    pub provider_name: String,

    /// The provider's subject identifier.
    pub external_subject_id: String,

    /// Email from the provider, pre-filled for the form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the provider verified the email.
    pub email_confirmed: bool,

    /// Phone number from the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Whether the provider verified the phone number.
    pub phone_confirmed: bool,

    /// Display name from the provider, pre-filled for the form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Where to send the user after confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,

    /// When the ticket stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl PendingRegistration {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    fn login(&self) -> ExternalLogin {
        ExternalLogin::new(&self.provider_name, &self.external_subject_id)
    }
}

// =============================================================================
// Service
// =============================================================================

/// Orchestrates external logins for all schemes.
pub struct ExternalLoginService {
    resolver: SchemeResolver,
    handlers: Arc<HandlerProvider>,
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionIssuer>,
    config: FederationConfig,
    pending: DashMap<String, PendingRegistration>,
}

impl ExternalLoginService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        resolver: SchemeResolver,
        handlers: Arc<HandlerProvider>,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionIssuer>,
        config: FederationConfig,
    ) -> Self {
        Self {
            resolver,
            handlers,
            identities,
            sessions,
            config,
            pending: DashMap::new(),
        }
    }

    /// The scheme resolver.
    #[must_use]
    pub fn resolver(&self) -> &SchemeResolver {
        &self.resolver
    }

    /// The handler provider.
    #[must_use]
    pub fn handlers(&self) -> &Arc<HandlerProvider> {
        &self.handlers
    }

    /// Number of unconfirmed registrations currently held.
    #[must_use]
    pub fn pending_registrations(&self) -> usize {
        self.pending.len()
    }

    /// Starts a login with `scheme`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a non-local `return_url`,
    /// `AuthError::NotFound` for an unknown scheme, or the handler's error.
    pub async fn challenge(
        &self,
        scheme: &str,
        return_url: &str,
        ctx: &RequestContext,
    ) -> AuthResult<ChallengeRedirect> {
        if !is_local_return_url(return_url) {
            return Err(AuthError::validation(format!(
                "return URL must be a local path: {return_url}"
            )));
        }

        let scheme = self.resolver.get_scheme(scheme, ctx).await?;
        let handler = self
            .handlers
            .get_handler(&scheme.name, ctx)
            .await?
            .ok_or_else(|| AuthError::not_found("scheme", &scheme.name))?;

        let redirect = handler.challenge(return_url, ctx).await?;
        info!(
            scheme = %scheme.name,
            family = ?scheme.family,
            request_id = %ctx.request_id,
            "External login challenge issued"
        );
        Ok(redirect)
    }

    /// Processes the provider callback for `scheme`.
    ///
    /// Nothing is written. Any handler failure, or a callback that yields no
    /// result, is reported as a remote protocol error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` for an unknown scheme,
    /// `AuthError::RemoteProtocol`, or `AuthError::Cancelled`.
    pub async fn handle_callback(
        &self,
        scheme: &str,
        payload: &CallbackPayload,
        ctx: &RequestContext,
    ) -> AuthResult<ExternalLoginResult> {
        let handler = self
            .handlers
            .get_handler(scheme, ctx)
            .await?
            .ok_or_else(|| AuthError::not_found("scheme", scheme))?;

        match handler.handle_callback(payload, ctx).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => {
                warn!(scheme = %scheme, request_id = %ctx.request_id, "Callback produced no login result");
                Err(AuthError::remote_protocol(scheme, "callback produced no login result"))
            }
            Err(AuthError::Cancelled) => Err(AuthError::Cancelled),
            Err(e) => {
                warn!(
                    scheme = %scheme,
                    error = %e,
                    request_id = %ctx.request_id,
                    "External login callback failed"
                );
                match e {
                    AuthError::RemoteProtocol { .. } => Err(e),
                    other => Err(AuthError::remote_protocol(scheme, other.to_string())),
                }
            }
        }
    }

    /// Runs the callback and completes the login in one step.
    ///
    /// # Errors
    ///
    /// See [`handle_callback`](Self::handle_callback) and
    /// [`complete_login`](Self::complete_login).
    pub async fn finish_external_login(
        &self,
        scheme: &str,
        payload: &CallbackPayload,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        let result = self.handle_callback(scheme, payload, ctx).await?;
        self.complete_login(&result, ctx).await
    }

    /// Resolves an external login result to a local identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownExternalUser` when no subject claim is
    /// present (before any lookup), a storage error, or `AuthError::Cancelled`.
    pub async fn complete_login(
        &self,
        result: &ExternalLoginResult,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        let provider = result.provider_name.as_str();
        let subject = self.subject_of(result)?;

        let existing = ctx
            .run(self.identities.find_by_external_login(provider, subject))
            .await?;
        if let Some(identity) = existing {
            return self
                .sign_in_existing(identity, result.return_url.clone(), ctx)
                .await;
        }

        if self.config.is_auto_provision_denied(provider) {
            info!(provider = %provider, "Auto-provisioning denied for provider");
            return Ok(LoginOutcome::Unsupported {
                provider: provider.to_string(),
            });
        }

        if self.auto_provision_enabled(provider, ctx).await? {
            return self.auto_provision(result, subject, ctx).await;
        }

        let registration = self.hold_registration(result, subject);
        info!(
            provider = %provider,
            request_id = %ctx.request_id,
            "External login needs registration confirmation"
        );
        Ok(LoginOutcome::NeedsConfirmation { registration })
    }

    /// Creates the account for a pending registration and signs it in.
    ///
    /// The ticket is consumed on success. A taken username leaves the ticket
    /// redeemable so the user can pick another.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a blank or taken username or an
    /// unknown or expired ticket, a storage error, or `AuthError::Cancelled`.
    pub async fn confirm_pending_registration(
        &self,
        ticket: &str,
        chosen_username: &str,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        let username = chosen_username.trim();
        if username.is_empty() {
            return Err(AuthError::validation("username is required"));
        }

        let now = OffsetDateTime::now_utc();
        let registration = self
            .pending
            .get(ticket)
            .map(|entry| entry.value().clone())
            .filter(|r| !r.is_expired(now));
        let Some(registration) = registration else {
            self.pending.remove(ticket);
            return Err(AuthError::validation("registration ticket is unknown or expired"));
        };

        let mut identity = LocalIdentity::new(username);
        if let Some(email) = &registration.email {
            identity = identity.with_email(email, registration.email_confirmed);
        }
        if let Some(phone) = &registration.phone_number {
            identity = identity.with_phone_number(phone, registration.phone_confirmed);
        }
        let login = registration.login();

        match ctx
            .run(self.identities.create_with_login(&identity, &login))
            .await
        {
            Ok(created) => {
                self.pending.remove(ticket);
                info!(
                    provider = %login.provider_name,
                    identity_id = %created.id,
                    "Registration confirmed"
                );
                let session = self.start_session(&created, ctx).await?;
                Ok(LoginOutcome::SignedIn {
                    session,
                    return_url: registration.return_url,
                })
            }
            Err(AuthError::Conflict { .. }) => {
                let linked = ctx
                    .run(self.identities.find_by_external_login(
                        &login.provider_name,
                        &login.external_subject_id,
                    ))
                    .await?;
                match linked {
                    Some(existing) => {
                        self.pending.remove(ticket);
                        self.sign_in_existing(existing, registration.return_url, ctx)
                            .await
                    }
                    None => Err(AuthError::validation(format!(
                        "username '{username}' is already taken"
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Links an external login to an existing identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownExternalUser` when no subject claim is
    /// present, `AuthError::NotFound` for an unknown identity,
    /// `AuthError::Conflict` if the login is linked elsewhere, or a storage error.
    pub async fn link_external_login(
        &self,
        identity_id: &str,
        result: &ExternalLoginResult,
        ctx: &RequestContext,
    ) -> AuthResult<LocalIdentity> {
        let subject = self.subject_of(result)?;
        let login = ExternalLogin::new(&result.provider_name, subject);
        let identity = ctx
            .run(self.identities.add_external_login(identity_id, &login))
            .await?;
        info!(
            provider = %login.provider_name,
            identity_id = %identity.id,
            "External login linked"
        );
        Ok(identity)
    }

    fn subject_of<'a>(&self, result: &'a ExternalLoginResult) -> AuthResult<&'a str> {
        result
            .external_subject_id(&self.config.subject_claim_types)
            .ok_or_else(|| {
                warn!(provider = %result.provider_name, "External login has no subject claim");
                AuthError::unknown_external_user(&result.provider_name)
            })
    }

    async fn auto_provision_enabled(&self, provider: &str, ctx: &RequestContext) -> AuthResult<bool> {
        if self.resolver.registry().contains(provider) {
            return Ok(false);
        }
        match ctx.run(self.resolver.store().find_by_name(provider)).await {
            Ok(config) => Ok(config.is_some_and(|c| c.auto_provision)),
            Err(AuthError::Cancelled) => Err(AuthError::Cancelled),
            Err(e) => {
                warn!(
                    provider = %provider,
                    error = %e,
                    "Provider lookup failed, falling back to confirmation"
                );
                Ok(false)
            }
        }
    }

    async fn auto_provision(
        &self,
        result: &ExternalLoginResult,
        subject: &str,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        let provider = result.provider_name.as_str();
        let username = format!(
            "{}{}",
            self.config.generated_username_prefix,
            uuid::Uuid::new_v4().simple()
        );
        let mut identity = LocalIdentity::new(username);
        if let Some((email, verified)) = result.email() {
            identity = identity.with_email(email, verified);
        }
        if let Some((phone, verified)) = result.phone_number() {
            identity = identity.with_phone_number(phone, verified);
        }
        let login = ExternalLogin::new(provider, subject);

        match ctx
            .run(self.identities.create_with_login(&identity, &login))
            .await
        {
            Ok(created) => {
                info!(
                    provider = %provider,
                    identity_id = %created.id,
                    request_id = %ctx.request_id,
                    "Identity auto-provisioned"
                );
                let session = self.start_session(&created, ctx).await?;
                Ok(LoginOutcome::AutoProvisioned {
                    session,
                    return_url: result.return_url.clone(),
                })
            }
            Err(AuthError::Conflict { name, message }) => {
                let linked = ctx
                    .run(self.identities.find_by_external_login(provider, subject))
                    .await?;
                match linked {
                    Some(existing) => {
                        info!(provider = %provider, "Concurrent provisioning detected, signing in");
                        self.sign_in_existing(existing, result.return_url.clone(), ctx)
                            .await
                    }
                    None => Err(AuthError::Conflict { name, message }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_existing(
        &self,
        identity: LocalIdentity,
        return_url: Option<String>,
        ctx: &RequestContext,
    ) -> AuthResult<LoginOutcome> {
        if ctx.run(self.identities.is_locked_out(&identity)).await? {
            warn!(identity_id = %identity.id, "External login for locked-out identity");
            return Ok(LoginOutcome::LockedOut {
                identity_id: identity.id,
            });
        }
        let session = self.start_session(&identity, ctx).await?;
        Ok(LoginOutcome::SignedIn {
            session,
            return_url,
        })
    }

    async fn start_session(
        &self,
        identity: &LocalIdentity,
        ctx: &RequestContext,
    ) -> AuthResult<Session> {
        let session = ctx
            .run(
                self.sessions
                    .start_session(identity, self.config.persistent_sessions),
            )
            .await?;
        info!(
            identity_id = %identity.id,
            session_id = %session.id,
            request_id = %ctx.request_id,
            "Session started"
        );
        Ok(session)
    }

    fn hold_registration(&self, result: &ExternalLoginResult, subject: &str) -> PendingRegistration {
        let now = OffsetDateTime::now_utc();
        self.pending.retain(|_, r| !r.is_expired(now));

        let email = result.email();
        let phone = result.phone_number();
        let registration = PendingRegistration {
            ticket: uuid::Uuid::new_v4().to_string(),
            provider_name: result.provider_name.clone(),
            external_subject_id: subject.to_string(),
            email: email.map(|(e, _)| e.to_string()),
            email_confirmed: email.is_some_and(|(_, v)| v),
            phone_number: phone.map(|(p, _)| p.to_string()),
            phone_confirmed: phone.is_some_and(|(_, v)| v),
            display_name: result.display_name().map(str::to_string),
            return_url: result.return_url.clone(),
            expires_at: now + self.config.pending_registration_ttl,
        };
        self.pending
            .insert(registration.ticket.clone(), registration.clone());
        registration
    }
}

impl std::fmt::Debug for ExternalLoginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalLoginService")
            .field("resolver", &self.resolver)
            .field("handlers", &self.handlers)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Returns `true` if `url` is a path on this host (no scheme, no authority).
#[must_use]
pub fn is_local_return_url(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.starts_with("/\\")
        && !url.chars().any(char::is_control)
}
