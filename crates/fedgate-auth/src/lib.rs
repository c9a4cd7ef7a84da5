//! # fedgate-auth
//!
//! Dynamic external identity provider support for an authentication server.
//!
//! This crate provides:
//! - Scheme resolution across build-time and runtime-registered providers
//! - Protocol options built from stored provider records
//! - Lazily constructed, cached protocol handlers
//! - The external login flow with account auto-provisioning
//! - Axum handlers for the challenge, callback and confirmation endpoints
//!
//! ## Overview
//!
//! Providers live in two namespaces. Static schemes are registered at startup
//! with a ready handler. Dynamic schemes are [`ProviderConfig`] records in a
//! [`ProviderStore`]; their handlers are built on first use and cached until
//! invalidated. Static names always win.
//!
//! ## Modules
//!
//! - [`config`] - Gateway configuration and loader
//! - [`context`] - Per-request context with cancellation
//! - [`error`] - Error types
//! - [`federation`] - Schemes, options, handlers and the login orchestrator
//! - [`storage`] - Storage traits for providers, identities and sessions
//! - [`http`] - Axum HTTP handlers
//!
//! [`ProviderConfig`]: federation::ProviderConfig
//! [`ProviderStore`]: storage::ProviderStore

pub mod config;
pub mod context;
pub mod error;
pub mod federation;
pub mod http;
pub mod storage;

pub use config::{FederationConfig, GatewayConfig, HandlerConfig};
pub use context::RequestContext;
pub use error::{AuthError, ErrorCategory};
pub use federation::{
    CallbackPayload, ChallengeRedirect, ExternalLoginResult, ExternalLoginService,
    HandlerProvider, LoginOutcome, OptionsFactory, PendingRegistration, ProviderConfig, Scheme,
    SchemeFamily, SchemeHandler, SchemeResolver, StaticSchemeRegistry,
};
pub use http::{ExternalLoginState, external_login_router};
pub use storage::{
    ExternalLogin, IdentityStore, LocalIdentity, ProviderStore, Session, SessionIssuer,
};

/// Type alias for gateway results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use fedgate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{FederationConfig, GatewayConfig, HandlerConfig};
    pub use crate::context::RequestContext;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::federation::{
        CallbackPayload, ChallengeRedirect, ClaimSet, DynamicHandlerFactory, ExternalLoginResult,
        ExternalLoginService, HandlerProvider, LoginOutcome, OidcBackchannel, OidcHandlerFactory,
        OidcOptions, OptionsFactory, PendingRegistration, PostConfigureRegistry, ProtocolHandler,
        ProviderConfig, Scheme, SchemeFamily, SchemeHandler, SchemeResolver,
        StaticHandlerResolver, StaticSchemeRegistry,
    };
    pub use crate::http::{ExternalLoginState, external_login_router};
    pub use crate::storage::{
        ExternalLogin, IdentityStore, LocalIdentity, ProviderStore, Session, SessionIssuer,
    };
}
