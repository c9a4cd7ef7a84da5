//! External login endpoints.
//!
//! # Routes
//!
//! ```text
//! GET  /auth/external                      -> JSON list of schemes
//! GET  /auth/external/{scheme}?return_url= -> 302 to the provider
//! GET  <callback template>                 -> JSON login outcome
//! POST /auth/external/confirm              -> JSON login outcome
//! ```
//!
//! The callback template is `HandlerConfig::default_callback_path`
//! (`/auth/external/{scheme}/callback` by default), the same path handlers
//! send to the provider as `redirect_uri`. Providers with a stored callback
//! path override are served by the router fallback, which maps the request
//! path back to the provider; overrides must not fall under the routes above.
//!
//! Locked-out and unsupported outcomes are answered with 403 errors rather
//! than a JSON outcome.
//!
//! # Usage
//!
//! ```ignore
//! use fedgate_auth::http::{ExternalLoginState, external_login_router};
//!
//! let app = external_login_router(ExternalLoginState::new(service, origin));
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::federation::handler::CallbackPayload;
use crate::federation::login::{ExternalLoginService, LoginOutcome};
use crate::federation::scheme::Scheme;

/// Route that starts a login.
pub const CHALLENGE_ROUTE: &str = "/auth/external/{scheme}";

// =============================================================================
// State Types
// =============================================================================

/// State shared by the external login endpoints.
#[derive(Clone)]
pub struct ExternalLoginState {
    /// The login orchestrator.
    pub service: Arc<ExternalLoginService>,
    /// Public origin used to build redirect URIs.
    pub origin: Url,
}

impl ExternalLoginState {
    /// Creates a new state.
    pub fn new(service: Arc<ExternalLoginService>, origin: Url) -> Self {
        Self { service, origin }
    }

    fn context(&self) -> RequestContext {
        RequestContext::new(self.origin.clone())
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters for the challenge endpoint.
#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    /// Local path to return to after login; defaults to `/`.
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Body of the registration confirmation endpoint.
#[derive(Debug, Deserialize)]
pub struct ConfirmRegistrationRequest {
    /// Ticket from the `needs_confirmation` outcome.
    pub ticket: String,
    /// Username chosen by the user.
    pub username: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Lists every scheme a user can sign in with.
pub async fn list_schemes_handler(
    State(state): State<ExternalLoginState>,
) -> Result<Json<Vec<Scheme>>, AuthError> {
    let ctx = state.context();
    let schemes = state.service.resolver().all_schemes(&ctx).await?;
    Ok(Json(schemes))
}

/// Starts an external login by redirecting to the provider.
pub async fn challenge_handler(
    State(state): State<ExternalLoginState>,
    Path(scheme): Path<String>,
    Query(query): Query<ChallengeQuery>,
) -> Result<Response, AuthError> {
    let ctx = state.context();
    let return_url = query.return_url.as_deref().unwrap_or("/");
    let redirect = state.service.challenge(&scheme, return_url, &ctx).await?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, redirect.location.to_string())],
    )
        .into_response())
}

/// Receives the provider callback on the templated route.
pub async fn callback_handler(
    State(state): State<ExternalLoginState>,
    Path(scheme): Path<String>,
    Query(payload): Query<CallbackPayload>,
) -> Result<Json<LoginOutcome>, AuthError> {
    let ctx = state.context();
    finish_callback(&state, &scheme, &payload, &ctx).await
}

/// Receives callbacks on stored per-provider paths.
pub async fn callback_override_handler(
    State(state): State<ExternalLoginState>,
    uri: Uri,
    Query(payload): Query<CallbackPayload>,
) -> Result<Json<LoginOutcome>, AuthError> {
    let ctx = state.context();
    let scheme = state
        .service
        .resolver()
        .scheme_for_callback_path(uri.path(), &ctx)
        .await?
        .ok_or_else(|| AuthError::not_found("route", uri.path()))?;
    finish_callback(&state, &scheme, &payload, &ctx).await
}

async fn finish_callback(
    state: &ExternalLoginState,
    scheme: &str,
    payload: &CallbackPayload,
    ctx: &RequestContext,
) -> Result<Json<LoginOutcome>, AuthError> {
    let outcome = state
        .service
        .finish_external_login(scheme, payload, ctx)
        .await?;
    info!(
        scheme = %scheme,
        outcome = outcome.kind(),
        request_id = %ctx.request_id,
        "External login completed"
    );
    refuse_denied(outcome).map(Json)
}

/// Turns outcomes that end without a session into HTTP errors.
fn refuse_denied(outcome: LoginOutcome) -> Result<LoginOutcome, AuthError> {
    match outcome {
        LoginOutcome::LockedOut { .. } => Err(AuthError::LockedOut),
        LoginOutcome::Unsupported { provider } => Err(AuthError::unsupported_provider(provider)),
        other => Ok(other),
    }
}

/// Confirms a pending registration with the chosen username.
pub async fn confirm_handler(
    State(state): State<ExternalLoginState>,
    Json(request): Json<ConfirmRegistrationRequest>,
) -> Result<Json<LoginOutcome>, AuthError> {
    let ctx = state.context();
    let outcome = state
        .service
        .confirm_pending_registration(&request.ticket, &request.username, &ctx)
        .await?;
    refuse_denied(outcome).map(Json)
}

/// Router with all external login endpoints.
///
/// An invalid callback template is logged and left unrouted; only stored
/// overrides are then reachable.
pub fn external_login_router(state: ExternalLoginState) -> Router {
    let handlers = state.service.handlers().options().defaults();
    let mut router = Router::new()
        .route("/auth/external", get(list_schemes_handler))
        .route("/auth/external/confirm", post(confirm_handler))
        .route(CHALLENGE_ROUTE, get(challenge_handler));

    match handlers.validate_callback_template() {
        Ok(()) => {
            router = router.route(&handlers.default_callback_path, get(callback_handler));
        }
        Err(msg) => warn!(error = %msg, "Callback template not routable"),
    }

    router.fallback(callback_override_handler).with_state(state)
}
