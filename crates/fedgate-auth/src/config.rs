//! Gateway configuration.
//!
//! Configuration is read from an optional TOML file and overridden by
//! environment variables with the `FEDGATE` prefix and `__` separator, e.g.
//! `FEDGATE__FEDERATION__PERSISTENT_SESSIONS=true`.
//!
//! # Example (TOML)
//!
//! ```toml
//! [federation]
//! subject_claim_types = ["sub", "oid"]
//! auto_provision_denylist = ["legacy-saml"]
//! pending_registration_ttl = "15m"
//!
//! [handlers]
//! default_callback_path = "/auth/external/{scheme}/callback"
//! correlation_lifetime = "10m"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::federation::provider::{SCHEME_PLACEHOLDER, validate_callback_path};
use crate::http::external_login::CHALLENGE_ROUTE;

/// Root configuration for the gateway core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// External login policy.
    pub federation: FederationConfig,

    /// Dynamic protocol handler defaults.
    pub handlers: HandlerConfig,
}

impl GatewayConfig {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` when a value is unusable.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.federation.subject_claim_types.is_empty() {
            return Err(AuthError::configuration(
                "federation.subject_claim_types must not be empty",
            ));
        }
        self.handlers.validate_callback_template().map_err(|msg| {
            AuthError::configuration(format!("handlers.default_callback_path: {msg}"))
        })?;
        if self.federation.pending_registration_ttl.is_zero() {
            return Err(AuthError::configuration(
                "federation.pending_registration_ttl must be positive",
            ));
        }
        Ok(())
    }
}

/// External login policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Claim types that may carry the external subject id, in priority order.
    pub subject_claim_types: Vec<String>,

    /// Providers that must never auto-provision accounts.
    pub auto_provision_denylist: Vec<String>,

    /// How long an unconfirmed registration stays redeemable.
    #[serde(with = "humantime_serde")]
    pub pending_registration_ttl: Duration,

    /// Whether sessions started after an external login are persistent.
    pub persistent_sessions: bool,

    /// Prefix for generated usernames of auto-provisioned accounts.
    pub generated_username_prefix: String,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            subject_claim_types: vec![
                "sub".to_string(),
                "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier"
                    .to_string(),
                "oid".to_string(),
            ],
            auto_provision_denylist: Vec::new(),
            pending_registration_ttl: Duration::from_secs(15 * 60),
            persistent_sessions: false,
            generated_username_prefix: "ext_".to_string(),
        }
    }
}

impl FederationConfig {
    /// Returns `true` if `provider` may never auto-provision accounts.
    #[must_use]
    pub fn is_auto_provision_denied(&self, provider: &str) -> bool {
        self.auto_provision_denylist.iter().any(|p| p == provider)
    }

    /// Adds a provider to the auto-provision denylist.
    #[must_use]
    pub fn with_denied_provider(mut self, provider: impl Into<String>) -> Self {
        self.auto_provision_denylist.push(provider.into());
        self
    }

    /// Replaces the subject claim types.
    #[must_use]
    pub fn with_subject_claim_types(mut self, types: Vec<impl Into<String>>) -> Self {
        self.subject_claim_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the pending registration lifetime.
    #[must_use]
    pub fn with_pending_registration_ttl(mut self, ttl: Duration) -> Self {
        self.pending_registration_ttl = ttl;
        self
    }
}

/// Defaults applied to dynamically constructed protocol handlers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Callback path template used when a provider has no override.
    ///
    /// Must contain `{scheme}` as a whole path segment; it is replaced by the
    /// provider name, and the HTTP router serves the template as a route.
    pub default_callback_path: String,

    /// Scopes every dynamic handler requests before provider scopes.
    pub default_scopes: Vec<String>,

    /// How long an issued challenge can be answered by a callback.
    #[serde(with = "humantime_serde")]
    pub correlation_lifetime: Duration,

    /// Whether challenges carry a PKCE code challenge.
    pub use_pkce: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            default_callback_path: "/auth/external/{scheme}/callback".to_string(),
            default_scopes: vec!["openid".to_string(), "profile".to_string()],
            correlation_lifetime: Duration::from_secs(10 * 60),
            use_pkce: true,
        }
    }
}

impl HandlerConfig {
    /// Checks that the callback template can be served as a per-scheme route.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate_callback_template(&self) -> Result<(), String> {
        let template = self.default_callback_path.as_str();
        validate_callback_path(template)?;
        let placeholder_segments = template
            .split('/')
            .filter(|segment| *segment == SCHEME_PLACEHOLDER)
            .count();
        if placeholder_segments != 1 || template.matches(SCHEME_PLACEHOLDER).count() != 1 {
            return Err(format!(
                "must contain {SCHEME_PLACEHOLDER} exactly once as a whole segment: {template}"
            ));
        }
        if template.replace(SCHEME_PLACEHOLDER, "").contains(['{', '}']) {
            return Err(format!("unexpected route parameter: {template}"));
        }
        if template == CHALLENGE_ROUTE {
            return Err(format!("collides with the challenge route: {template}"));
        }
        Ok(())
    }
}

/// Loads [`GatewayConfig`] from a TOML file and the environment.
pub mod loader {
    use super::{GatewayConfig, PathBuf};
    use crate::error::AuthError;
use crate::federation::provider::{SCHEME_PLACEHOLDER, validate_callback_path};
use crate::http::external_login::CHALLENGE_ROUTE;
    use config::{Config, Environment, File};

    /// Default configuration file name, looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "fedgate.toml";

    /// Loads configuration from `path` (or [`DEFAULT_CONFIG_FILE`]) plus
    /// `FEDGATE__*` environment overrides. Missing files are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if parsing or validation fails.
    pub fn load_config(path: Option<&str>) -> Result<GatewayConfig, AuthError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("FEDGATE")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("federation.subject_claim_types")
                .with_list_parse_key("federation.auto_provision_denylist")
                .with_list_parse_key("handlers.default_scopes"),
        );
        let cfg = builder
            .build()
            .map_err(|e| AuthError::configuration(format!("config build error: {e}")))?;
        let merged: GatewayConfig = cfg
            .try_deserialize()
            .map_err(|e| AuthError::configuration(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        tracing::debug!(
            subject_claims = merged.federation.subject_claim_types.len(),
            denylist = merged.federation.auto_provision_denylist.len(),
            "Gateway configuration loaded"
        );
        Ok(merged)
    }
}
