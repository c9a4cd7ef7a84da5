//! Protocol handler abstraction.
//!
//! A protocol handler performs the challenge/callback exchange for one scheme.
//! Handlers come from two places:
//!
//! - **Static**: registered at startup and owned by the static registry
//! - **Dynamic**: built on demand from a stored [`ProviderConfig`] and cached
//!   by the [`HandlerProvider`]
//!
//! [`SchemeHandler`] tags which of the two a handler is, so callers can tell
//! whether provider-specific policy (auto-provisioning) applies.
//!
//! [`ProviderConfig`]: super::provider::ProviderConfig
//! [`HandlerProvider`]: super::handler_provider::HandlerProvider

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::claims::ExternalLoginResult;
use super::options::{OidcOptions, StaticOptionsMonitor};
use super::scheme::SchemeFamily;
use crate::AuthResult;
use crate::context::RequestContext;

// =============================================================================
// Exchange Types
// =============================================================================

/// Redirect that starts an external login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeRedirect {
    /// Where to send the user agent.
    pub location: Url,

    /// Opaque correlation value the provider echoes back.
    pub state: String,
}

/// Query parameters the provider sends to the callback path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackPayload {
    /// Authorization code.
    pub code: Option<String>,

    /// Correlation value from the challenge.
    pub state: Option<String>,

    /// OAuth error code, if the provider refused.
    pub error: Option<String>,

    /// Human-readable error description.
    pub error_description: Option<String>,
}

impl CallbackPayload {
    /// Creates a successful payload.
    #[must_use]
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// Creates an error payload.
    #[must_use]
    pub fn failure(error: impl Into<String>, state: Option<String>) -> Self {
        Self {
            error: Some(error.into()),
            state,
            ..Self::default()
        }
    }
}

// =============================================================================
// Handler Trait
// =============================================================================

/// The challenge/callback exchange for one scheme.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// The scheme this handler serves.
    fn scheme_name(&self) -> &str;

    /// Binds the handler to its options. Called once, before first use.
    ///
    /// Static handlers are configured at registration and keep the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be applied.
    fn initialize(
        &mut self,
        options: StaticOptionsMonitor<OidcOptions>,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        let _ = (options, ctx);
        Ok(())
    }

    /// Builds the redirect that sends the user to the provider.
    ///
    /// `return_url` is where the user lands after the login completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's endpoints cannot be resolved.
    async fn challenge(
        &self,
        return_url: &str,
        ctx: &RequestContext,
    ) -> AuthResult<ChallengeRedirect>;

    /// Processes the provider's callback.
    ///
    /// `Ok(None)` means the callback carried nothing this handler could use.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider reported a failure or the response is invalid.
    async fn handle_callback(
        &self,
        payload: &CallbackPayload,
        ctx: &RequestContext,
    ) -> AuthResult<Option<ExternalLoginResult>>;
}

/// A handler tagged with where it came from.
#[derive(Clone)]
pub enum SchemeHandler {
    /// Owned by the static registry.
    Static(Arc<dyn ProtocolHandler>),
    /// Built from a stored provider record.
    Dynamic(Arc<dyn ProtocolHandler>),
}

impl SchemeHandler {
    /// The family the handler belongs to.
    #[must_use]
    pub fn family(&self) -> SchemeFamily {
        match self {
            Self::Static(_) => SchemeFamily::Static,
            Self::Dynamic(_) => SchemeFamily::Dynamic,
        }
    }

    /// The underlying handler.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn ProtocolHandler> {
        match self {
            Self::Static(h) | Self::Dynamic(h) => h,
        }
    }

    /// The scheme this handler serves.
    #[must_use]
    pub fn scheme_name(&self) -> &str {
        self.inner().scheme_name()
    }

    /// Returns `true` if both values wrap the same handler instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.inner(), other.inner())
    }

    /// See [`ProtocolHandler::challenge`].
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    pub async fn challenge(
        &self,
        return_url: &str,
        ctx: &RequestContext,
    ) -> AuthResult<ChallengeRedirect> {
        self.inner().challenge(return_url, ctx).await
    }

    /// See [`ProtocolHandler::handle_callback`].
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    pub async fn handle_callback(
        &self,
        payload: &CallbackPayload,
        ctx: &RequestContext,
    ) -> AuthResult<Option<ExternalLoginResult>> {
        self.inner().handle_callback(payload, ctx).await
    }
}

impl fmt::Debug for SchemeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeHandler")
            .field("family", &self.family())
            .field("scheme", &self.scheme_name())
            .finish()
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Resolves handlers for statically registered schemes.
pub trait StaticHandlerResolver: Send + Sync {
    /// The handler for `name`, if it is a static scheme.
    fn static_handler(&self, name: &str) -> Option<Arc<dyn ProtocolHandler>>;
}

/// Constructs uninitialized handlers for dynamic schemes.
pub trait DynamicHandlerFactory: Send + Sync {
    /// Creates a handler for `scheme_name`; the caller initializes it.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler can be built for the scheme.
    fn create(&self, scheme_name: &str) -> AuthResult<Box<dyn ProtocolHandler>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::claims::ClaimSet;

    struct EchoHandler;

    #[async_trait]
    impl ProtocolHandler for EchoHandler {
        fn scheme_name(&self) -> &str {
            "echo"
        }

        async fn challenge(
            &self,
            return_url: &str,
            _ctx: &RequestContext,
        ) -> AuthResult<ChallengeRedirect> {
            let mut location = Url::parse("https://idp.example/authorize").unwrap();
            location.query_pairs_mut().append_pair("return", return_url);
            Ok(ChallengeRedirect {
                location,
                state: "s".to_string(),
            })
        }

        async fn handle_callback(
            &self,
            payload: &CallbackPayload,
            _ctx: &RequestContext,
        ) -> AuthResult<Option<ExternalLoginResult>> {
            Ok(payload.code.as_ref().map(|code| {
                ExternalLoginResult::new("echo", ClaimSet::new().with("sub", code.clone()))
            }))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Url::parse("https://login.example.com").unwrap())
    }

    #[tokio::test]
    async fn test_scheme_handler_dispatch() {
        let handler = SchemeHandler::Dynamic(Arc::new(EchoHandler));
        assert_eq!(handler.family(), SchemeFamily::Dynamic);
        assert_eq!(handler.scheme_name(), "echo");

        let redirect = handler.challenge("/home", &ctx()).await.unwrap();
        assert!(redirect.location.as_str().contains("return=%2Fhome"));

        let result = handler
            .handle_callback(&CallbackPayload::success("u-1", "s"), &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.claims.value("sub"), Some("u-1"));

        let none = handler
            .handle_callback(&CallbackPayload::default(), &ctx())
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_same_instance() {
        let inner: Arc<dyn ProtocolHandler> = Arc::new(EchoHandler);
        let a = SchemeHandler::Static(Arc::clone(&inner));
        let b = SchemeHandler::Static(inner);
        let c = SchemeHandler::Static(Arc::new(EchoHandler));
        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&c));
        assert_eq!(format!("{a:?}"), r#"SchemeHandler { family: Static, scheme: "echo" }"#);
    }

    #[test]
    fn test_default_initialize_is_noop() {
        let mut handler = EchoHandler;
        let options = crate::federation::options::OptionsFactory::new(
            crate::config::HandlerConfig::default(),
            Arc::default(),
        )
        .create_options_monitor(&crate::federation::provider::ProviderConfig::new(
            "echo",
            "https://idp.example",
            "c",
        ))
        .unwrap();
        assert!(handler.initialize(options, &ctx()).is_ok());
    }

    #[test]
    fn test_callback_payload_deserialize() {
        let payload: CallbackPayload =
            serde_json::from_str(r#"{"error":"access_denied","state":"abc"}"#).unwrap();
        assert_eq!(payload, CallbackPayload::failure("access_denied", Some("abc".into())));
    }
}
