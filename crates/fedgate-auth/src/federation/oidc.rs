//! Dynamic OIDC protocol handler.
//!
//! [`OidcHandler`] runs the authorization code flow for one stored provider.
//! Everything that touches the wire (discovery, code redemption, ID token
//! validation) goes through the [`OidcBackchannel`] collaborator; the handler
//! owns correlation state, PKCE material and request shaping.
//!
//! # Flow
//!
//! 1. `challenge` resolves the authorization endpoint, records a pending
//!    challenge keyed by a random `state`, and returns the redirect
//! 2. `handle_callback` consumes the pending challenge for the echoed
//!    `state`, redeems the code and checks the nonce
//!
//! Pending challenges expire after the configured correlation lifetime and
//! are pruned whenever a new challenge is recorded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::claims::{ClaimSet, ExternalLoginResult, claim_types};
use super::handler::{
    CallbackPayload, ChallengeRedirect, DynamicHandlerFactory, ProtocolHandler,
};
use super::options::{AuthorizationRequest, OidcOptions, StaticOptionsMonitor};
use crate::AuthResult;
use crate::context::RequestContext;
use crate::error::AuthError;

/// Wire-level OIDC operations provided by the hosting server.
#[async_trait]
pub trait OidcBackchannel: Send + Sync {
    /// Resolves the authorization endpoint for `authority` (usually via discovery).
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    async fn authorization_endpoint(&self, authority: &Url) -> AuthResult<Url>;

    /// Redeems an authorization code and returns the validated ID token claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the code or the ID
    /// token fails validation.
    async fn redeem_code(
        &self,
        options: &OidcOptions,
        code: &str,
        redirect_uri: &Url,
        code_verifier: Option<&str>,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>>;
}

#[derive(Debug)]
struct PendingChallenge {
    nonce: String,
    code_verifier: Option<String>,
    redirect_uri: Url,
    return_url: String,
    created_at: Instant,
}

/// Authorization code flow handler for one dynamic provider.
pub struct OidcHandler {
    scheme: String,
    backchannel: Arc<dyn OidcBackchannel>,
    correlation_lifetime: Duration,
    options: Option<StaticOptionsMonitor<OidcOptions>>,
    pending: DashMap<String, PendingChallenge>,
}

impl OidcHandler {
    /// Creates an uninitialized handler.
    #[must_use]
    pub fn new(
        scheme: impl Into<String>,
        backchannel: Arc<dyn OidcBackchannel>,
        correlation_lifetime: Duration,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            backchannel,
            correlation_lifetime,
            options: None,
            pending: DashMap::new(),
        }
    }

    /// The options the handler is bound to.
    #[must_use]
    pub fn options(&self) -> Option<Arc<OidcOptions>> {
        self.options.as_ref().map(StaticOptionsMonitor::current_value)
    }

    /// Number of challenges awaiting a callback.
    #[must_use]
    pub fn pending_challenges(&self) -> usize {
        self.pending.len()
    }

    fn bound_options(&self) -> AuthResult<Arc<OidcOptions>> {
        self.options().ok_or_else(|| {
            AuthError::internal(format!("handler for {} used before initialize", self.scheme))
        })
    }

    fn prune_expired(&self) {
        let lifetime = self.correlation_lifetime;
        self.pending
            .retain(|_, challenge| challenge.created_at.elapsed() < lifetime);
    }

    fn remote(&self, message: impl Into<String>) -> AuthError {
        AuthError::remote_protocol(&self.scheme, message)
    }
}

impl std::fmt::Debug for OidcHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcHandler")
            .field("scheme", &self.scheme)
            .field("initialized", &self.options.is_some())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProtocolHandler for OidcHandler {
    fn scheme_name(&self) -> &str {
        &self.scheme
    }

    fn initialize(
        &mut self,
        options: StaticOptionsMonitor<OidcOptions>,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        if self.options.is_some() {
            return Err(AuthError::internal(format!(
                "handler for {} initialized twice",
                self.scheme
            )));
        }
        let current = options.current_value();
        if current.scheme != self.scheme {
            return Err(AuthError::internal(format!(
                "options for {} passed to handler for {}",
                current.scheme, self.scheme
            )));
        }
        current.redirect_uri(&ctx.origin)?;
        self.options = Some(options);
        Ok(())
    }

    async fn challenge(
        &self,
        return_url: &str,
        ctx: &RequestContext,
    ) -> AuthResult<ChallengeRedirect> {
        let options = self.bound_options()?;
        let mut location = ctx
            .run(self.backchannel.authorization_endpoint(&options.authority))
            .await
            .map_err(|e| match e {
                AuthError::Cancelled => AuthError::Cancelled,
                other => self.remote(format!("authorization endpoint unavailable: {other}")),
            })?;
        let redirect_uri = options.redirect_uri(&ctx.origin)?;

        let state = random_token();
        let nonce = random_token();
        let code_verifier = options.use_pkce.then(random_token);

        let mut request = AuthorizationRequest::default();
        request.set("client_id", options.client_id.as_str());
        request.set("redirect_uri", redirect_uri.as_str());
        request.set("response_type", options.response_type.as_str());
        request.set("scope", options.scope_string());
        request.set("state", state.as_str());
        request.set("nonce", nonce.as_str());
        if let Some(verifier) = &code_verifier {
            request.set("code_challenge", code_challenge(verifier));
            request.set("code_challenge_method", "S256");
        }
        options.apply_request_hooks(&mut request);
        request.apply_to(&mut location);

        self.prune_expired();
        self.pending.insert(
            state.clone(),
            PendingChallenge {
                nonce,
                code_verifier,
                redirect_uri,
                return_url: return_url.to_string(),
                created_at: Instant::now(),
            },
        );

        debug!(
            scheme = %self.scheme,
            request_id = %ctx.request_id,
            pending = self.pending.len(),
            "Issued external login challenge"
        );

        Ok(ChallengeRedirect { location, state })
    }

    async fn handle_callback(
        &self,
        payload: &CallbackPayload,
        ctx: &RequestContext,
    ) -> AuthResult<Option<ExternalLoginResult>> {
        let options = self.bound_options()?;

        let pending = payload
            .state
            .as_deref()
            .and_then(|state| self.pending.remove(state))
            .map(|(_, challenge)| challenge);

        if let Some(error) = &payload.error {
            let description = payload.error_description.as_deref().unwrap_or_default();
            return Err(self.remote(format!("{error}: {description}")));
        }

        let Some(pending) = pending else {
            return Err(self.remote("unknown or missing state"));
        };
        if pending.created_at.elapsed() >= self.correlation_lifetime {
            return Err(self.remote("login attempt expired"));
        }

        let Some(code) = payload.code.as_deref() else {
            return Ok(None);
        };

        let claims = ctx
            .run(self.backchannel.redeem_code(
                &options,
                code,
                &pending.redirect_uri,
                pending.code_verifier.as_deref(),
            ))
            .await
            .map_err(|e| match e {
                AuthError::Cancelled => AuthError::Cancelled,
                other => self.remote(format!("code redemption failed: {other}")),
            })?;

        let claims = ClaimSet::from_json(&claims);
        if claims.value(claim_types::NONCE) != Some(pending.nonce.as_str()) {
            return Err(self.remote("nonce mismatch"));
        }

        debug!(
            scheme = %self.scheme,
            request_id = %ctx.request_id,
            claims = claims.len(),
            "External login callback accepted"
        );

        Ok(Some(
            ExternalLoginResult::new(&self.scheme, claims).with_return_url(pending.return_url),
        ))
    }
}

/// Builds [`OidcHandler`]s for dynamic schemes.
#[derive(Clone)]
pub struct OidcHandlerFactory {
    backchannel: Arc<dyn OidcBackchannel>,
    correlation_lifetime: Duration,
}

impl OidcHandlerFactory {
    /// Creates a factory sharing one backchannel across handlers.
    #[must_use]
    pub fn new(backchannel: Arc<dyn OidcBackchannel>, correlation_lifetime: Duration) -> Self {
        Self {
            backchannel,
            correlation_lifetime,
        }
    }
}

impl DynamicHandlerFactory for OidcHandlerFactory {
    fn create(&self, scheme_name: &str) -> AuthResult<Box<dyn ProtocolHandler>> {
        Ok(Box::new(OidcHandler::new(
            scheme_name,
            Arc::clone(&self.backchannel),
            self.correlation_lifetime,
        )))
    }
}

fn random_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
