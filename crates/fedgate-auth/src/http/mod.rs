//! HTTP handlers for external login.
//!
//! This module provides Axum handlers and the `IntoResponse` mapping for
//! [`AuthError`](crate::error::AuthError).
//!
//! # Available Handlers
//!
//! - [`external_login`] - Scheme listing, challenge, callback and registration confirmation

mod error;
pub mod external_login;

pub use external_login::{
    CHALLENGE_ROUTE, ChallengeQuery, ConfirmRegistrationRequest, ExternalLoginState,
    callback_handler, callback_override_handler, challenge_handler, confirm_handler,
    external_login_router, list_schemes_handler,
};
