//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fedgate_auth::federation::{
    ChallengeRedirect, OidcBackchannel, OidcHandler, OidcHandlerFactory, OidcOptions,
    OptionsFactory, PostConfigureRegistry, ProtocolHandler,
};
use fedgate_auth::prelude::*;
use fedgate_memory::{InMemoryIdentityStore, InMemoryProviderStore, InMemorySessionIssuer};
use url::Url;

pub const ORIGIN: &str = "https://login.example.com";

pub fn ctx() -> RequestContext {
    RequestContext::new(Url::parse(ORIGIN).unwrap())
}

// =============================================================================
// Backchannel stub
// =============================================================================

/// Answers code redemption from codes registered by the test.
#[derive(Default)]
pub struct StubBackchannel {
    codes: Mutex<HashMap<String, serde_json::Map<String, serde_json::Value>>>,
}

impl StubBackchannel {
    /// Makes `code` redeemable for `claims`, adding the nonce from `challenge`.
    pub fn issue_code(&self, code: &str, challenge: &ChallengeRedirect, claims: serde_json::Value) {
        let mut claims = claims.as_object().cloned().unwrap_or_default();
        claims.insert("nonce".into(), nonce_of(challenge).into());
        self.codes.lock().unwrap().insert(code.to_string(), claims);
    }
}

#[async_trait]
impl OidcBackchannel for StubBackchannel {
    async fn authorization_endpoint(&self, authority: &Url) -> AuthResult<Url> {
        authority
            .join("authorize")
            .map_err(|e| AuthError::internal(e.to_string()))
    }

    async fn redeem_code(
        &self,
        _options: &OidcOptions,
        code: &str,
        _redirect_uri: &Url,
        _code_verifier: Option<&str>,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
        self.codes
            .lock()
            .unwrap()
            .remove(code)
            .ok_or_else(|| AuthError::internal(format!("invalid_grant: {code}")))
    }
}

pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn nonce_of(challenge: &ChallengeRedirect) -> String {
    query_param(&challenge.location, "nonce").unwrap_or_default()
}

// =============================================================================
// Counting provider store
// =============================================================================

/// Wraps the in-memory store and counts `find_by_name` calls.
#[derive(Default)]
pub struct CountingProviderStore {
    pub inner: InMemoryProviderStore,
    pub lookups: AtomicUsize,
}

impl CountingProviderStore {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderStore for CountingProviderStore {
    async fn find_by_name(&self, name: &str) -> AuthResult<Option<ProviderConfig>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_name(name).await
    }

    async fn list_all(&self) -> AuthResult<Vec<ProviderConfig>> {
        self.inner.list_all().await
    }

    async fn exists(&self, name: &str) -> AuthResult<bool> {
        self.inner.exists(name).await
    }

    async fn upsert(&self, config: &ProviderConfig) -> AuthResult<()> {
        self.inner.upsert(config).await
    }

    async fn remove(&self, name: &str) -> AuthResult<bool> {
        self.inner.remove(name).await
    }
}

// =============================================================================
// Gateway fixture
// =============================================================================

pub struct Gateway {
    pub service: Arc<ExternalLoginService>,
    pub providers: Arc<CountingProviderStore>,
    pub identities: Arc<InMemoryIdentityStore>,
    pub sessions: Arc<InMemorySessionIssuer>,
    pub backchannel: Arc<StubBackchannel>,
    pub post_configure: Arc<PostConfigureRegistry>,
}

impl Gateway {
    /// Runs challenge and callback for `scheme` with the given claims.
    pub async fn login(&self, scheme: &str, code: &str, claims: serde_json::Value) -> AuthResult<LoginOutcome> {
        let ctx = ctx();
        let challenge = self.service.challenge(scheme, "/apps", &ctx).await?;
        self.backchannel.issue_code(code, &challenge, claims);
        self.service
            .finish_external_login(scheme, &CallbackPayload::success(code, &challenge.state), &ctx)
            .await
    }
}

pub fn okta() -> ProviderConfig {
    ProviderConfig::new("okta", "https://okta.example", "abc")
        .with_display_name("Okta")
        .with_auto_provision(true)
}

pub fn auth0() -> ProviderConfig {
    ProviderConfig::new("auth0", "https://tenant.auth0.example", "def").with_display_name("Auth0")
}

/// Builds a gateway with a static `Google` scheme and the given stored providers.
pub async fn gateway(config: GatewayConfig, stored: Vec<ProviderConfig>) -> Gateway {
    let backchannel = Arc::new(StubBackchannel::default());
    let post_configure = Arc::new(PostConfigureRegistry::new());
    let options = OptionsFactory::new(config.handlers.clone(), Arc::clone(&post_configure));

    let providers = Arc::new(CountingProviderStore {
        inner: InMemoryProviderStore::with_providers(stored),
        lookups: AtomicUsize::new(0),
    });
    let registry = Arc::new(StaticSchemeRegistry::new());
    let resolver = SchemeResolver::new(registry.clone(), providers.clone());

    let google = ProviderConfig::new("Google", "https://accounts.google.example", "google-client");
    let mut google_handler = OidcHandler::new("Google", backchannel.clone(), Duration::from_secs(600));
    google_handler
        .initialize(options.create_options_monitor(&google).unwrap(), &ctx())
        .unwrap();
    resolver
        .add_scheme("Google", "Google", Arc::new(google_handler), &ctx())
        .await
        .unwrap();

    let handlers = Arc::new(HandlerProvider::new(
        registry,
        providers.clone(),
        options,
        Arc::new(OidcHandlerFactory::new(
            backchannel.clone(),
            config.handlers.correlation_lifetime,
        )),
    ));

    let identities = Arc::new(InMemoryIdentityStore::new());
    let sessions = Arc::new(InMemorySessionIssuer::new());
    let service = Arc::new(ExternalLoginService::new(
        resolver,
        handlers,
        identities.clone(),
        sessions.clone(),
        config.federation,
    ));

    // Lookups made while wiring up are not part of any test.
    providers.lookups.store(0, Ordering::SeqCst);

    Gateway {
        service,
        providers,
        identities,
        sessions,
        backchannel,
        post_configure,
    }
}
