//! In-memory storage backends for fedgate.
//!
//! This crate implements the storage traits from `fedgate-auth::storage`
//! with process-local state guarded by `tokio::sync::RwLock`. It suits tests
//! and single-node deployments; nothing survives a restart.
//!
//! # Example
//!
//! ```ignore
//! use fedgate_memory::{InMemoryIdentityStore, InMemoryProviderStore};
//! use fedgate_auth::federation::ProviderConfig;
//!
//! let providers = InMemoryProviderStore::new();
//! providers.upsert(&ProviderConfig::new("okta", "https://okta.example", "abc")).await?;
//!
//! let identities = InMemoryIdentityStore::new();
//! ```

pub mod identity;
pub mod provider;
pub mod session;

pub use identity::InMemoryIdentityStore;
pub use provider::InMemoryProviderStore;
pub use session::InMemorySessionIssuer;
