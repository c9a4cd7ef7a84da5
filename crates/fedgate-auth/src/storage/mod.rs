//! Storage traits consumed by the gateway core.
//!
//! This module defines interfaces for:
//!
//! - Provider configuration records (the dynamic scheme namespace)
//! - Local identities and their external login links
//! - Session issuance after a successful login
//!
//! # Implementations
//!
//! - `fedgate-memory` - in-process backend for tests and single-node setups

pub mod identity;
pub mod provider;
pub mod session;

pub use identity::{ExternalLogin, IdentityStore, LocalIdentity};
pub use provider::ProviderStore;
pub use session::{Session, SessionIssuer};
