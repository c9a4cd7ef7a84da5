//! HTTP error responses.
//!
//! Implements `IntoResponse` for [`AuthError`]. Errors that carry provider or
//! backend detail are logged in full and answered with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = error_details(&self);

        if status.is_server_error() || matches!(self, AuthError::RemoteProtocol { .. }) {
            tracing::warn!(
                error = %self,
                category = %self.category(),
                status = status.as_u16(),
                "External login request failed"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "External login request rejected");
        }

        let body = json!({
            "error": code,
            "error_description": message,
        });
        (status, Json(body)).into_response()
    }
}

/// Returns (HTTP status, error code, user-facing message).
fn error_details(error: &AuthError) -> (StatusCode, &'static str, String) {
    match error {
        AuthError::NotFound { kind, name } => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Unknown {kind}: {name}"),
        ),
        AuthError::Conflict { message, .. } => {
            (StatusCode::CONFLICT, "conflict", message.clone())
        }
        AuthError::Validation { message } => {
            (StatusCode::BAD_REQUEST, "invalid_request", message.clone())
        }
        AuthError::RemoteProtocol { .. } => (
            StatusCode::BAD_GATEWAY,
            "external_login_failed",
            "The external provider could not complete the login".to_string(),
        ),
        AuthError::UnknownExternalUser { .. } => (
            StatusCode::BAD_REQUEST,
            "unknown_external_user",
            "The external provider did not identify the user".to_string(),
        ),
        AuthError::LockedOut => (
            StatusCode::FORBIDDEN,
            "locked_out",
            "Account is locked out".to_string(),
        ),
        AuthError::UnsupportedProvider { provider } => (
            StatusCode::FORBIDDEN,
            "unsupported_provider",
            format!("Provider '{provider}' does not support this operation"),
        ),
        AuthError::ProviderUnusable { provider, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            format!("Provider '{provider}' is not available"),
        ),
        AuthError::Cancelled => (
            StatusCode::REQUEST_TIMEOUT,
            "cancelled",
            "Request cancelled".to_string(),
        ),
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal server error".to_string(),
            )
        }
    }
}
