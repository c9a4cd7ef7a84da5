//! Scheme resolution across the static registry and the provider store.
//!
//! Two namespaces contribute schemes:
//!
//! - the [`StaticSchemeRegistry`], filled at startup with handlers that are
//!   fully configured in code
//! - the [`ProviderStore`], holding runtime-registered providers that become
//!   dynamic schemes
//!
//! Static names win: a stored provider whose name matches a static scheme is
//! shadowed, never merged. Writes to either namespace reject names held by
//! the other. Writes made through one [`SchemeResolver`] (and its clones) are
//! serialized, so the check and the write cannot interleave with a write to
//! the other namespace. Writes that go to the store directly bypass this.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::handler::{ProtocolHandler, StaticHandlerResolver};
use super::provider::{ProviderConfig, SCHEME_PLACEHOLDER};
use crate::AuthResult;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::storage::ProviderStore;

/// Where a scheme comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeFamily {
    /// Registered at startup.
    Static,
    /// Backed by a provider store record.
    Dynamic,
}

/// A named authentication scheme. Derived on each lookup, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scheme {
    /// Unique scheme name.
    pub name: String,

    /// Human-readable name for login buttons.
    pub display_name: String,

    /// Which namespace the scheme belongs to.
    pub family: SchemeFamily,
}

impl Scheme {
    fn dynamic(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            display_name: config.display_name.clone(),
            family: SchemeFamily::Dynamic,
        }
    }
}

// =============================================================================
// Static Registry
// =============================================================================

struct StaticRegistration {
    scheme: Scheme,
    handler: Arc<dyn ProtocolHandler>,
}

/// Schemes registered at startup, kept in registration order.
#[derive(Default)]
pub struct StaticSchemeRegistry {
    entries: RwLock<IndexMap<String, StaticRegistration>>,
}

impl StaticSchemeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scheme. Returns `false` if the name is already taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        handler: Arc<dyn ProtocolHandler>,
    ) -> bool {
        let name = name.into();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.contains_key(&name) {
            return false;
        }
        let scheme = Scheme {
            name: name.clone(),
            display_name: display_name.into(),
            family: SchemeFamily::Static,
        };
        entries.insert(name, StaticRegistration { scheme, handler });
        true
    }

    /// Removes a scheme. Returns `true` if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .shift_remove(name)
            .is_some()
    }

    /// Returns `true` if `name` is a static scheme.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name)
    }

    /// The static scheme named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Scheme> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .map(|r| r.scheme.clone())
    }

    /// All static schemes in registration order.
    #[must_use]
    pub fn schemes(&self) -> Vec<Scheme> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(|r| r.scheme.clone())
            .collect()
    }

    /// Number of registered schemes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StaticHandlerResolver for StaticSchemeRegistry {
    fn static_handler(&self, name: &str) -> Option<Arc<dyn ProtocolHandler>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .map(|r| Arc::clone(&r.handler))
    }
}

impl std::fmt::Debug for StaticSchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSchemeRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

// =============================================================================
// Scheme Resolver
// =============================================================================

/// Resolves scheme names against both namespaces.
#[derive(Clone)]
pub struct SchemeResolver {
    registry: Arc<StaticSchemeRegistry>,
    store: Arc<dyn ProviderStore>,
    writes: Arc<Mutex<()>>,
}

impl SchemeResolver {
    /// Creates a resolver over a static registry and a provider store.
    #[must_use]
    pub fn new(registry: Arc<StaticSchemeRegistry>, store: Arc<dyn ProviderStore>) -> Self {
        Self {
            registry,
            store,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// The static registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StaticSchemeRegistry> {
        &self.registry
    }

    /// The provider store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProviderStore> {
        &self.store
    }

    /// Every scheme: static ones in registration order, then stored providers
    /// in store order. Names are unique; static entries shadow stored ones.
    ///
    /// A failing store yields only the static schemes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cancelled` if the request goes away.
    pub async fn all_schemes(&self, ctx: &RequestContext) -> AuthResult<Vec<Scheme>> {
        let mut schemes = self.registry.schemes();

        let stored = match ctx.run(self.store.list_all()).await {
            Ok(stored) => stored,
            Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                warn!(error = %e, request_id = %ctx.request_id, "Provider store listing failed");
                Vec::new()
            }
        };

        for config in &stored {
            if schemes.iter().any(|s| s.name == config.name) {
                debug!(scheme = %config.name, "Stored provider shadowed by static scheme");
                continue;
            }
            schemes.push(Scheme::dynamic(config));
        }
        Ok(schemes)
    }

    /// Looks up a scheme: static registry first, then an exact,
    /// case-sensitive store lookup.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if neither namespace has the name (store
    /// failures included) or `AuthError::Cancelled`.
    pub async fn get_scheme(&self, name: &str, ctx: &RequestContext) -> AuthResult<Scheme> {
        if let Some(scheme) = self.registry.get(name) {
            return Ok(scheme);
        }

        match ctx.run(self.store.find_by_name(name)).await {
            Ok(Some(config)) => Ok(Scheme::dynamic(&config)),
            Ok(None) => Err(AuthError::not_found("scheme", name)),
            Err(AuthError::Cancelled) => Err(AuthError::Cancelled),
            Err(e) => {
                warn!(
                    scheme = %name,
                    error = %e,
                    request_id = %ctx.request_id,
                    "Provider store lookup failed, treating scheme as unknown"
                );
                Err(AuthError::not_found("scheme", name))
            }
        }
    }

    /// Finds the stored provider whose callback path override is `path`.
    ///
    /// Providers shadowed by a static scheme are skipped. A failing store
    /// yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cancelled` if the request goes away.
    pub async fn scheme_for_callback_path(
        &self,
        path: &str,
        ctx: &RequestContext,
    ) -> AuthResult<Option<String>> {
        let stored = match ctx.run(self.store.list_all()).await {
            Ok(stored) => stored,
            Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                warn!(path = %path, error = %e, "Provider store listing failed during callback routing");
                return Ok(None);
            }
        };

        Ok(stored
            .into_iter()
            .filter(|config| !self.registry.contains(&config.name))
            .find(|config| {
                config
                    .callback_path
                    .as_deref()
                    .is_some_and(|p| p.replace(SCHEME_PLACEHOLDER, &config.name) == path)
            })
            .map(|config| config.name))
    }

    /// Registers a static scheme.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the name is held by a stored provider
    /// or another static scheme, or a store error.
    pub async fn add_scheme(
        &self,
        name: &str,
        display_name: &str,
        handler: Arc<dyn ProtocolHandler>,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        let _guard = self.writes.lock().await;
        if ctx.run(self.store.exists(name)).await? {
            return Err(AuthError::conflict(
                name,
                format!("scheme name '{name}' is already used by a stored provider"),
            ));
        }
        if !self.registry.register(name, display_name, handler) {
            return Err(AuthError::conflict(
                name,
                format!("static scheme '{name}' is already registered"),
            ));
        }
        info!(scheme = %name, "Static scheme registered");
        Ok(())
    }

    /// Removes a static scheme. Stored providers are untouched.
    pub fn remove_scheme(&self, name: &str) -> bool {
        let removed = self.registry.unregister(name);
        if removed {
            info!(scheme = %name, "Static scheme removed");
        }
        removed
    }

    /// Validates and stores a provider record.
    ///
    /// Cached handlers for the provider are not refreshed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for an invalid record,
    /// `AuthError::Conflict` if a static scheme holds the name, or a store error.
    pub async fn upsert_provider(
        &self,
        config: &ProviderConfig,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        config.validate()?;
        let _guard = self.writes.lock().await;
        if self.registry.contains(&config.name) {
            return Err(AuthError::conflict(
                &config.name,
                format!("provider name '{}' is reserved by a static scheme", config.name),
            ));
        }
        ctx.run(self.store.upsert(config)).await?;
        info!(provider = %config.name, "Provider stored");
        Ok(())
    }

    /// Removes a provider record. Returns `true` if one was removed.
    ///
    /// # Errors
    ///
    /// Returns a store error or `AuthError::Cancelled`.
    pub async fn remove_provider(&self, name: &str, ctx: &RequestContext) -> AuthResult<bool> {
        let removed = ctx.run(self.store.remove(name)).await?;
        if removed {
            info!(provider = %name, "Provider removed");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SchemeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeResolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
