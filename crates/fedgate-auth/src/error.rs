//! Error types for scheme resolution and external login.
//!
//! Every fallible operation in this crate returns [`AuthError`]. Remote
//! protocol failures carry the raw provider message for diagnostics; the HTTP
//! layer never echoes it back to the end user.

use std::fmt;

/// Errors that can occur while resolving schemes or completing an external login.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The requested scheme or provider does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up (e.g. "scheme", "provider", "identity").
        kind: &'static str,
        /// The name or id that was not found.
        name: String,
    },

    /// A scheme or provider name is already taken in the other namespace,
    /// or an external login is already linked.
    #[error("Conflict: {message}")]
    Conflict {
        /// The conflicting name.
        name: String,
        /// Description of the conflict.
        message: String,
    },

    /// Input or stored configuration failed validation.
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The external provider returned an error or an unusable response.
    #[error("Remote protocol error from {provider}: {message}")]
    RemoteProtocol {
        /// The provider (scheme) name.
        provider: String,
        /// Raw error, for logs only.
        message: String,
    },

    /// The external assertion carried no usable subject claim.
    #[error("External login from {provider} has no usable subject claim")]
    UnknownExternalUser {
        /// The provider (scheme) name.
        provider: String,
    },

    /// The local identity is locked out.
    ///
    /// The login flow reports this as `LoginOutcome::LockedOut`; the HTTP
    /// layer raises it when answering such an outcome.
    #[error("Account is locked out")]
    LockedOut,

    /// The provider may not be used for the requested operation.
    ///
    /// Raised by the HTTP layer for `LoginOutcome::Unsupported`.
    #[error("Provider does not support this operation: {provider}")]
    UnsupportedProvider {
        /// The provider (scheme) name.
        provider: String,
    },

    /// A provider record exists but cannot be turned into a working handler.
    #[error("Provider {provider} is misconfigured: {message}")]
    ProviderUnusable {
        /// The provider name.
        provider: String,
        /// What is wrong with the stored configuration.
        message: String,
    },

    /// A storage backend failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The inbound request was cancelled before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// The gateway configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `RemoteProtocol` error.
    #[must_use]
    pub fn remote_protocol(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteProtocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnknownExternalUser` error.
    #[must_use]
    pub fn unknown_external_user(provider: impl Into<String>) -> Self {
        Self::UnknownExternalUser {
            provider: provider.into(),
        }
    }

    /// Creates a new `UnsupportedProvider` error.
    #[must_use]
    pub fn unsupported_provider(provider: impl Into<String>) -> Self {
        Self::UnsupportedProvider {
            provider: provider.into(),
        }
    }

    /// Creates a new `ProviderUnusable` error.
    #[must_use]
    pub fn provider_unusable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnusable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the caller supplied something invalid.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::Validation { .. }
                | Self::UnknownExternalUser { .. }
                | Self::LockedOut
                | Self::UnsupportedProvider { .. }
        )
    }

    /// Returns `true` if the failure originated outside this process.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(self, Self::RemoteProtocol { .. } | Self::Storage { .. })
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Resolution,
            Self::Conflict { .. } | Self::Validation { .. } => ErrorCategory::Validation,
            Self::RemoteProtocol { .. } => ErrorCategory::Federation,
            Self::UnknownExternalUser { .. }
            | Self::LockedOut
            | Self::UnsupportedProvider { .. } => ErrorCategory::Login,
            Self::ProviderUnusable { .. } | Self::Configuration { .. } => {
                ErrorCategory::Configuration
            }
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Broad error categories, used for logging and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unknown scheme, provider or identity.
    Resolution,
    /// Rejected input or conflicting names.
    Validation,
    /// External provider failure.
    Federation,
    /// Login outcome that ends the attempt.
    Login,
    /// Misconfigured provider or gateway.
    Configuration,
    /// Storage backend failure.
    Infrastructure,
    /// The request went away.
    Cancelled,
    /// Bug or invariant violation.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resolution => "resolution",
            Self::Validation => "validation",
            Self::Federation => "federation",
            Self::Login => "login",
            Self::Configuration => "configuration",
            Self::Infrastructure => "infrastructure",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}
