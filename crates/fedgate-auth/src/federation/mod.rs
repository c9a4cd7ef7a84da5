//! External identity provider federation.
//!
//! This module provides:
//!
//! - Provider configuration records and validation
//! - Scheme resolution across static and stored providers
//! - Protocol options built from stored records
//! - Lazily constructed, cached protocol handlers
//! - The external login state machine with auto-provisioning

pub mod claims;
pub mod handler;
pub mod handler_provider;
pub mod login;
pub mod oidc;
pub mod options;
pub mod provider;
pub mod scheme;

pub use claims::{Claim, ClaimSet, ExternalLoginResult, claim_types};
pub use handler::{
    CallbackPayload, ChallengeRedirect, DynamicHandlerFactory, ProtocolHandler, SchemeHandler,
    StaticHandlerResolver,
};
pub use handler_provider::HandlerProvider;
pub use login::{ExternalLoginService, LoginOutcome, PendingRegistration, is_local_return_url};
pub use oidc::{OidcBackchannel, OidcHandler, OidcHandlerFactory};
pub use options::{
    AuthorizationRequest, AuthorizationRequestHook, ChangeSubscription, OidcOptions,
    OptionsFactory, PostConfigureHook, PostConfigureRegistry, StaticOptionsMonitor,
};
pub use provider::ProviderConfig;
pub use scheme::{Scheme, SchemeFamily, SchemeResolver, StaticSchemeRegistry};
