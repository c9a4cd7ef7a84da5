//! Lazy construction and caching of protocol handlers.
//!
//! Dynamic handlers are built on first use from the stored provider record
//! and kept for the life of the provider instance. Static handlers are owned
//! by the static registry and returned as-is; the registry is consulted before
//! the cache, so a static scheme registered later wins over a cached handler.
//!
//! The cache is a `DashMap` with get-or-add semantics: concurrent first
//! requests may each build a handler, but only the first insert is kept and
//! every caller receives that instance.
//!
//! Cached handlers are not refreshed when the store changes; call
//! [`HandlerProvider::invalidate`] after editing a provider.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::handler::{DynamicHandlerFactory, ProtocolHandler, SchemeHandler, StaticHandlerResolver};
use super::options::OptionsFactory;
use crate::AuthResult;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::storage::ProviderStore;

/// Resolves a scheme name to a ready-to-use handler.
pub struct HandlerProvider {
    statics: Arc<dyn StaticHandlerResolver>,
    store: Arc<dyn ProviderStore>,
    options: OptionsFactory,
    factory: Arc<dyn DynamicHandlerFactory>,
    cache: DashMap<String, Arc<dyn ProtocolHandler>>,
}

impl HandlerProvider {
    /// Creates a provider with an empty cache.
    #[must_use]
    pub fn new(
        statics: Arc<dyn StaticHandlerResolver>,
        store: Arc<dyn ProviderStore>,
        options: OptionsFactory,
        factory: Arc<dyn DynamicHandlerFactory>,
    ) -> Self {
        Self {
            statics,
            store,
            options,
            factory,
            cache: DashMap::new(),
        }
    }

    /// Returns the handler for `name`.
    ///
    /// `Ok(None)` means no scheme has that name, or the store could not be
    /// read.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ProviderUnusable` if a stored record cannot be
    /// turned into a working handler, or `AuthError::Cancelled`.
    pub async fn get_handler(
        &self,
        name: &str,
        ctx: &RequestContext,
    ) -> AuthResult<Option<SchemeHandler>> {
        if let Some(handler) = self.statics.static_handler(name) {
            if self.cache.remove(name).is_some() {
                info!(scheme = %name, "Cached dynamic handler shadowed by static scheme, dropped");
            }
            return Ok(Some(SchemeHandler::Static(handler)));
        }

        if let Some(cached) = self.cache.get(name) {
            return Ok(Some(SchemeHandler::Dynamic(Arc::clone(cached.value()))));
        }

        let config = match ctx.run(self.store.find_by_name(name)).await {
            Ok(Some(config)) => config,
            Ok(None) => return Ok(None),
            Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                warn!(
                    scheme = %name,
                    error = %e,
                    request_id = %ctx.request_id,
                    "Provider store lookup failed, no handler resolved"
                );
                return Ok(None);
            }
        };

        let options = self
            .options
            .create_options_monitor(&config)
            .map_err(|e| AuthError::provider_unusable(name, e.to_string()))?;
        let mut handler = self
            .factory
            .create(name)
            .map_err(|e| AuthError::provider_unusable(name, e.to_string()))?;
        handler
            .initialize(options, ctx)
            .map_err(|e| AuthError::provider_unusable(name, e.to_string()))?;

        let built: Arc<dyn ProtocolHandler> = Arc::from(handler);
        let cached = Arc::clone(
            self.cache
                .entry(name.to_string())
                .or_insert_with(|| Arc::clone(&built))
                .value(),
        );

        if Arc::ptr_eq(&built, &cached) {
            info!(scheme = %name, cached = self.cache.len(), "Dynamic handler constructed");
        } else {
            debug!(scheme = %name, "Concurrent handler construction lost the race, discarding");
        }

        Ok(Some(SchemeHandler::Dynamic(cached)))
    }

    /// The options factory used for dynamic handlers.
    #[must_use]
    pub fn options(&self) -> &OptionsFactory {
        &self.options
    }

    /// Drops the cached handler for `name`. The next lookup rebuilds it from
    /// the store. Returns `true` if an entry was removed.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.cache.remove(name).is_some();
        if removed {
            info!(scheme = %name, "Dynamic handler invalidated");
        }
        removed
    }

    /// Number of cached dynamic handlers.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for HandlerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerProvider")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
