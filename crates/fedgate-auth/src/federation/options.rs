//! Protocol options built from stored provider configuration.
//!
//! # Overview
//!
//! [`OptionsFactory::create_options`] turns a [`ProviderConfig`] into
//! [`OidcOptions`] in a fixed order:
//!
//! 1. **Base values** - authority, client credentials, callback path
//! 2. **Scopes** - handler defaults, then provider scopes not already present
//! 3. **Request hooks** - e.g. `acr_values` on the authorization request
//! 4. **Post-configuration** - caller-owned per-provider overrides, applied last
//! 5. **Validation** - the final options must still be usable
//!
//! Options are frozen once built. [`StaticOptionsMonitor`] exposes them through
//! a monitor-shaped API whose change subscription never fires; a provider edit
//! only takes effect after its handler is invalidated and rebuilt.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use url::Url;

use super::provider::{ProviderConfig, validate_callback_path};
use crate::AuthResult;
use crate::config::HandlerConfig;
use crate::error::AuthError;

// =============================================================================
// Authorization Request
// =============================================================================

/// Outbound authorization request, open to mutation by request hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Query parameters in the order they will be written.
    pub parameters: Vec<(String, String)>,
}

impl AuthorizationRequest {
    /// Sets a parameter, replacing any existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.parameters.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.parameters.push((key, value));
        }
    }

    /// Gets a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Appends all parameters to `url`'s query string.
    pub fn apply_to(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &self.parameters {
            pairs.append_pair(key, value);
        }
    }
}

/// Mutates the authorization request before redirecting to the provider.
pub type AuthorizationRequestHook = Arc<dyn Fn(&mut AuthorizationRequest) + Send + Sync>;

/// Overrides applied to freshly built options for one provider.
pub type PostConfigureHook = Arc<dyn Fn(&mut OidcOptions) + Send + Sync>;

// =============================================================================
// OIDC Options
// =============================================================================

/// Options a dynamic OIDC handler is bound to.
#[derive(Clone)]
pub struct OidcOptions {
    /// Scheme name these options belong to.
    pub scheme: String,

    /// OIDC authority (issuer) URL.
    pub authority: Url,

    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret for confidential clients.
    pub client_secret: Option<String>,

    /// Path on the gateway that receives the provider's callback.
    pub callback_path: String,

    /// Scopes to request, without duplicates.
    pub scopes: Vec<String>,

    /// OAuth response type.
    pub response_type: String,

    /// Whether challenges carry a PKCE code challenge.
    pub use_pkce: bool,

    /// Hooks run on every outbound authorization request, in order.
    pub request_hooks: Vec<AuthorizationRequestHook>,
}

impl OidcOptions {
    /// Adds a scope unless it is already present.
    pub fn add_scope(&mut self, scope: impl Into<String>) {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
    }

    /// Space-separated scope string for the authorization request.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Absolute redirect URI for the given public origin.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if the callback path cannot be joined.
    pub fn redirect_uri(&self, origin: &Url) -> AuthResult<Url> {
        origin.join(&self.callback_path).map_err(|e| {
            AuthError::validation(format!(
                "cannot build redirect URI from '{}': {e}",
                self.callback_path
            ))
        })
    }

    /// Runs all request hooks against `request`.
    pub fn apply_request_hooks(&self, request: &mut AuthorizationRequest) {
        for hook in &self.request_hooks {
            hook(request);
        }
    }

    fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::validation(format!(
                "provider {}: client_id is required",
                self.scheme
            )));
        }
        if self.authority.cannot_be_a_base() {
            return Err(AuthError::validation(format!(
                "provider {}: authority is not a base URL",
                self.scheme
            )));
        }
        validate_callback_path(&self.callback_path)
            .map_err(|msg| AuthError::validation(format!("provider {}: {msg}", self.scheme)))
    }
}

impl fmt::Debug for OidcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcOptions")
            .field("scheme", &self.scheme)
            .field("authority", &self.authority.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("callback_path", &self.callback_path)
            .field("scopes", &self.scopes)
            .field("response_type", &self.response_type)
            .field("use_pkce", &self.use_pkce)
            .field("request_hooks", &self.request_hooks.len())
            .finish()
    }
}

// =============================================================================
// Post-configuration Registry
// =============================================================================

/// Caller-owned per-provider overrides (tenant or environment specific).
#[derive(Default)]
pub struct PostConfigureRegistry {
    hooks: RwLock<HashMap<String, Vec<PostConfigureHook>>>,
}

impl PostConfigureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook for `provider`. Hooks run in registration order.
    pub fn register(
        &self,
        provider: impl Into<String>,
        hook: impl Fn(&mut OidcOptions) + Send + Sync + 'static,
    ) {
        let mut hooks = self
            .hooks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        hooks
            .entry(provider.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Applies every hook registered for `provider`.
    pub fn apply(&self, provider: &str, options: &mut OidcOptions) {
        let hooks = {
            let guard = self
                .hooks
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.get(provider).cloned().unwrap_or_default()
        };
        for hook in &hooks {
            hook(options);
        }
    }

    /// Number of hooks registered for `provider`.
    #[must_use]
    pub fn hook_count(&self, provider: &str) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(provider)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for PostConfigureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self
            .hooks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("PostConfigureRegistry")
            .field("providers", &guard.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Options Monitor
// =============================================================================

/// Immutable options holder with a monitor-shaped API.
#[derive(Debug)]
pub struct StaticOptionsMonitor<T> {
    value: Arc<T>,
}

impl<T> Clone for StaticOptionsMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> StaticOptionsMonitor<T> {
    /// Wraps a value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// The current value; always the one passed to [`new`](Self::new).
    #[must_use]
    pub fn current_value(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    /// Registers a change listener. The listener is dropped immediately and
    /// never invoked.
    pub fn on_change<F>(&self, listener: F) -> ChangeSubscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        drop(listener);
        ChangeSubscription { _private: () }
    }
}

/// Handle returned by [`StaticOptionsMonitor::on_change`]. Dropping it is a no-op.
#[derive(Debug)]
#[must_use = "subscriptions are usually kept alive for the listener's lifetime"]
pub struct ChangeSubscription {
    _private: (),
}

// =============================================================================
// Options Factory
// =============================================================================

/// Builds [`OidcOptions`] from provider configuration records.
#[derive(Debug, Clone)]
pub struct OptionsFactory {
    defaults: HandlerConfig,
    post_configure: Arc<PostConfigureRegistry>,
}

impl OptionsFactory {
    /// Creates a factory with handler defaults and a post-configuration registry.
    #[must_use]
    pub fn new(defaults: HandlerConfig, post_configure: Arc<PostConfigureRegistry>) -> Self {
        Self {
            defaults,
            post_configure,
        }
    }

    /// The handler defaults this factory applies.
    #[must_use]
    pub fn defaults(&self) -> &HandlerConfig {
        &self.defaults
    }

    /// The post-configuration registry shared with the caller.
    #[must_use]
    pub fn post_configure(&self) -> &Arc<PostConfigureRegistry> {
        &self.post_configure
    }

    /// Builds options for `config`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if the record or the post-configured
    /// options are unusable.
    pub fn create_options(&self, config: &ProviderConfig) -> AuthResult<OidcOptions> {
        let authority = config.authority_url()?;

        let mut options = OidcOptions {
            scheme: config.name.clone(),
            authority,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_path: config.resolved_callback_path(&self.defaults.default_callback_path),
            scopes: Vec::new(),
            response_type: "code".to_string(),
            use_pkce: self.defaults.use_pkce,
            request_hooks: Vec::new(),
        };

        for scope in self.defaults.default_scopes.iter().chain(config.scopes()) {
            options.add_scope(scope.clone());
        }

        if !config.acr_values.is_empty() {
            let acr_values = config.acr_values.join(" ");
            options.request_hooks.push(Arc::new(move |request| {
                request.set("acr_values", acr_values.clone());
            }));
        }

        self.post_configure.apply(&config.name, &mut options);

        options.validate()?;
        Ok(options)
    }

    /// Builds options for `config` wrapped in a frozen monitor.
    ///
    /// # Errors
    ///
    /// Same as [`create_options`](Self::create_options).
    pub fn create_options_monitor(
        &self,
        config: &ProviderConfig,
    ) -> AuthResult<StaticOptionsMonitor<OidcOptions>> {
        self.create_options(config).map(StaticOptionsMonitor::new)
    }
}
