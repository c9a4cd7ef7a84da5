//! Provider store trait.
//!
//! The store is the source of truth for runtime-registered providers. Reads
//! must be safe under concurrent callers; writes are serialized by the
//! implementation.

use async_trait::async_trait;

use crate::AuthResult;
use crate::federation::provider::ProviderConfig;

/// Storage operations for provider configuration records.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Find a provider by exact (ordinal, case-sensitive) name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails or the record is unreadable.
    async fn find_by_name(&self, name: &str) -> AuthResult<Option<ProviderConfig>>;

    /// List all providers in store order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_all(&self) -> AuthResult<Vec<ProviderConfig>>;

    /// Returns `true` if a provider with this exact name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn exists(&self, name: &str) -> AuthResult<bool>;

    /// Insert or replace a provider keyed by its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn upsert(&self, config: &ProviderConfig) -> AuthResult<()>;

    /// Remove a provider. Returns `true` if a record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, name: &str) -> AuthResult<bool>;
}
