//! External identity provider configuration records.
//!
//! A [`ProviderConfig`] is what the provider store persists for each
//! runtime-registered provider. It is turned into protocol options by
//! [`OptionsFactory`](super::options::OptionsFactory).
//!
//! # Example
//!
//! ```ignore
//! use fedgate_auth::federation::provider::ProviderConfig;
//!
//! let config = ProviderConfig::new("okta", "https://okta.example", "abc")
//!     .with_display_name("Okta")
//!     .with_scope("email")
//!     .with_acr_value("urn:okta:loa:2fa")
//!     .with_auto_provision(true);
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;

/// Configuration of one runtime-registered identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique key; also the scheme name.
    pub name: String,

    /// Human-readable name for login buttons.
    #[serde(default)]
    pub display_name: String,

    /// OIDC authority (issuer) URL.
    pub authority: String,

    /// OAuth client ID registered with the provider.
    pub client_id: String,

    /// OAuth client secret (None for public clients).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Callback path override; the handler default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_path: Option<String>,

    /// Extra scopes, kept in insertion order without duplicates.
    #[serde(default)]
    scopes: Vec<String>,

    /// Authentication context class references to request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acr_values: Vec<String>,

    /// Create local accounts on first login without confirmation.
    #[serde(default)]
    pub auto_provision: bool,
}

impl ProviderConfig {
    /// Creates a configuration with the required fields.
    ///
    /// The display name defaults to the provider name.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        authority: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            authority: authority.into(),
            client_id: client_id.into(),
            client_secret: None,
            callback_path: None,
            scopes: Vec::new(),
            acr_values: Vec::new(),
            auto_provision: false,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the callback path override.
    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = Some(path.into());
        self
    }

    /// Adds a scope unless it is already present.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.add_scope(scope);
        self
    }

    /// Adds an ACR value.
    #[must_use]
    pub fn with_acr_value(mut self, acr: impl Into<String>) -> Self {
        self.acr_values.push(acr.into());
        self
    }

    /// Sets whether first logins create accounts automatically.
    #[must_use]
    pub fn with_auto_provision(mut self, auto_provision: bool) -> Self {
        self.auto_provision = auto_provision;
        self
    }

    /// Adds a scope unless it is already present. Returns `true` if added.
    pub fn add_scope(&mut self, scope: impl Into<String>) -> bool {
        let scope = scope.into();
        if self.scopes.contains(&scope) {
            return false;
        }
        self.scopes.push(scope);
        true
    }

    /// The configured scopes in insertion order.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns `true` if this provider uses a confidential client.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }

    /// The callback path for this provider: the override if set, else
    /// `template`, with [`SCHEME_PLACEHOLDER`] replaced by the provider name.
    #[must_use]
    pub fn resolved_callback_path(&self, template: &str) -> String {
        self.callback_path
            .as_deref()
            .unwrap_or(template)
            .replace(SCHEME_PLACEHOLDER, &self.name)
    }

    /// Parses the authority URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if the authority is empty or not an
    /// absolute http(s) URL.
    pub fn authority_url(&self) -> AuthResult<Url> {
        if self.authority.trim().is_empty() {
            return Err(AuthError::validation(format!(
                "provider {}: authority is required",
                self.name
            )));
        }
        let url = Url::parse(&self.authority).map_err(|e| {
            AuthError::validation(format!(
                "provider {}: invalid authority '{}': {e}",
                self.name, self.authority
            ))
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(AuthError::validation(format!(
                "provider {}: authority must be an http(s) URL",
                self.name
            )));
        }
        Ok(url)
    }

    /// Validates the record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` describing the first problem found.
    pub fn validate(&self) -> AuthResult<()> {
        if self.name.trim().is_empty() {
            return Err(AuthError::validation("provider name is required"));
        }
        self.authority_url()?;
        if self.client_id.trim().is_empty() {
            return Err(AuthError::validation(format!(
                "provider {}: client_id is required",
                self.name
            )));
        }
        if let Some(path) = &self.callback_path {
            validate_callback_path(path)
                .map_err(|msg| AuthError::validation(format!("provider {}: {msg}", self.name)))?;
        }
        Ok(())
    }
}

/// Stands for the provider name in callback path templates.
pub const SCHEME_PLACEHOLDER: &str = "{scheme}";

/// Checks that a callback path is an absolute path without query or fragment.
pub(crate) fn validate_callback_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(format!("callback path must start with a single '/': {path}"));
    }
    if path.contains(['?', '#', '\\']) || path.chars().any(char::is_whitespace) {
        return Err(format!("malformed callback path: {path}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new("okta", "https://okta.example", "abc")
            .with_display_name("Okta")
            .with_client_secret("s3cret")
            .with_callback_path("/signin-okta")
            .with_acr_value("mfa")
            .with_auto_provision(true);

        assert_eq!(config.name, "okta");
        assert_eq!(config.display_name, "Okta");
        assert!(config.is_confidential());
        assert_eq!(config.callback_path.as_deref(), Some("/signin-okta"));
        assert_eq!(config.acr_values, vec!["mfa"]);
        assert!(config.auto_provision);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolved_callback_path() {
        let config = ProviderConfig::new("okta", "https://okta.example", "abc");
        assert_eq!(
            config.resolved_callback_path("/auth/external/{scheme}/callback"),
            "/auth/external/okta/callback"
        );
        let config = config.with_callback_path("/signin-{scheme}");
        assert_eq!(config.resolved_callback_path("/ignored"), "/signin-okta");
    }

    #[test]
    fn test_display_name_defaults_to_name() {
        let config = ProviderConfig::new("okta", "https://okta.example", "abc");
        assert_eq!(config.display_name, "okta");
        assert!(!config.auto_provision);
    }

    #[test]
    fn test_scopes_dedup_on_insert() {
        let mut config = ProviderConfig::new("okta", "https://okta.example", "abc")
            .with_scope("email")
            .with_scope("groups")
            .with_scope("email");
        assert_eq!(config.scopes(), &["email", "groups"]);
        assert!(!config.add_scope("groups"));
        assert!(config.add_scope("phone"));
        assert_eq!(config.scopes(), &["email", "groups", "phone"]);
    }

    #[test]
    fn test_validate_missing_authority() {
        let config = ProviderConfig::new("okta", "", "abc");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AuthError::Validation { .. }));
        assert!(err.to_string().contains("authority"));
    }

    #[test]
    fn test_validate_bad_authority_scheme() {
        let config = ProviderConfig::new("okta", "ftp://okta.example", "abc");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_client_id() {
        let config = ProviderConfig::new("okta", "https://okta.example", " ");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_validate_callback_path() {
        for bad in ["signin", "//evil.example/cb", "/cb?x=1", "/cb#frag", "/c b"] {
            let config =
                ProviderConfig::new("okta", "https://okta.example", "abc").with_callback_path(bad);
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_serialization_round_trip_keeps_scope_order() {
        let config = ProviderConfig::new("okta", "https://okta.example", "abc")
            .with_scope("b")
            .with_scope("a");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["scopes"], serde_json::json!(["b", "a"]));
        assert!(json.get("client_secret").is_none());

        let back: ProviderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
