//! In-memory provider store.

use async_trait::async_trait;
use fedgate_auth::AuthResult;
use fedgate_auth::federation::ProviderConfig;
use fedgate_auth::storage::ProviderStore;
use indexmap::IndexMap;
use tokio::sync::RwLock;

/// Provider records kept in insertion order.
///
/// Replacing a record keeps its original position.
#[derive(Debug, Default)]
pub struct InMemoryProviderStore {
    records: RwLock<IndexMap<String, ProviderConfig>>,
}

impl InMemoryProviderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `records`.
    ///
    /// Records are not validated; later duplicates replace earlier ones.
    pub fn with_providers(records: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let records = records
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ProviderStore for InMemoryProviderStore {
    async fn find_by_name(&self, name: &str) -> AuthResult<Option<ProviderConfig>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn list_all(&self) -> AuthResult<Vec<ProviderConfig>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn exists(&self, name: &str) -> AuthResult<bool> {
        Ok(self.records.read().await.contains_key(name))
    }

    async fn upsert(&self, config: &ProviderConfig) -> AuthResult<()> {
        let mut records = self.records.write().await;
        records.insert(config.name.clone(), config.clone());
        tracing::debug!(provider = %config.name, total = records.len(), "Provider upserted");
        Ok(())
    }

    async fn remove(&self, name: &str) -> AuthResult<bool> {
        Ok(self.records.write().await.shift_remove(name).is_some())
    }
}
