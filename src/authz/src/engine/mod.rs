//! Role engine
//!
//! Orchestrates principal role aggregation, group resolution, membership
//! evaluation and the per-principal cache behind one facade.
//!
//! ```text
//! Principal → GroupResolver (direct roles ∪ group closure) → RoleSet
//!                 ↓                                            ↓
//!          PrincipalRoleCache ─────────────────────→ has_role / check_role
//! ```

pub mod cache;

pub use cache::{CacheStats, PrincipalRoleCache};

use crate::config::EngineConfig;
use crate::error::{AuthzError, Result};
use crate::roles::{query, GroupResolver, MatchMode, RoleQuery, RoleSet};
use crate::store::EntityStore;
use crate::types::{GroupId, PrincipalId, Role, RoleGroup};

use std::sync::Arc;
use tracing::{debug, info};

/// Main role engine
pub struct RoleEngine {
    /// Entity store backend
    store: Arc<dyn EntityStore>,

    /// Group graph resolver
    resolver: GroupResolver,

    /// Per-principal role cache
    cache: Option<PrincipalRoleCache>,

    /// Engine configuration
    config: EngineConfig,
}

impl RoleEngine {
    /// Create an engine with the default configuration
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let config = EngineConfig::default();
        Self::build(store, config)
    }

    /// Create an engine with a custom configuration
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the configuration is unusable.
    pub fn with_config(store: Arc<dyn EntityStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        let resolver = GroupResolver::with_config(store.clone(), config.resolver);
        let cache = config
            .enable_cache
            .then(|| PrincipalRoleCache::new(config.cache.clone()));

        info!(
            "RoleEngine initialized with cache={}, max_depth={}, max_groups={}",
            config.enable_cache, config.resolver.max_depth, config.resolver.max_groups
        );

        Self {
            store,
            resolver,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying group resolver
    pub fn resolver(&self) -> &GroupResolver {
        &self.resolver
    }

    /// Effective roles of a principal, served from the cache when enabled
    ///
    /// # Errors
    ///
    /// `NotFound` if the principal is unknown.
    pub async fn resolve_all_roles(&self, principal: &PrincipalId) -> Result<Arc<RoleSet>> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_resolve(principal, || {
                        self.resolver.resolve_principal_traced(principal)
                    })
                    .await
            }
            None => Ok(Arc::new(self.resolver.resolve_all_roles(principal).await?)),
        }
    }

    /// Whether a principal holds the requested roles
    ///
    /// The query is validated before any resolution happens.
    pub async fn has_role(
        &self,
        principal: &PrincipalId,
        query: &RoleQuery,
        mode: MatchMode,
    ) -> Result<bool> {
        let names = query.names()?;
        let roles = self.resolve_all_roles(principal).await?;
        let allowed = query::matches_names(&roles, &names, mode);

        debug!(
            "has_role principal='{}' {} mode={} -> {}",
            principal, query, mode, allowed
        );

        Ok(allowed)
    }

    /// Like [`has_role`](Self::has_role), but a missing role is an error
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when the principal does not satisfy the query.
    pub async fn check_role(
        &self,
        principal: &PrincipalId,
        query: &RoleQuery,
        mode: MatchMode,
    ) -> Result<()> {
        if self.has_role(principal, query, mode).await? {
            return Ok(());
        }

        let required = match (query, mode) {
            (RoleQuery::One(_), _) => query.to_string(),
            (RoleQuery::Many(_), mode) => format!("{} of {}", mode, query),
        };
        Err(AuthzError::PermissionDenied {
            principal: principal.to_string(),
            required,
        })
    }

    /// All roles reachable from a group
    pub async fn resolve_group_roles(&self, group: GroupId) -> Result<RoleSet> {
        self.resolver.resolve_group_roles(group).await
    }

    /// Whether a group holds any of the requested roles, directly or nested
    pub async fn group_has_role(&self, group: GroupId, query: &RoleQuery) -> Result<bool> {
        self.resolver.group_has_role(group, query).await
    }

    /// Active role by name
    pub async fn role(&self, name: &str) -> Result<Role> {
        self.store
            .role_by_name(name)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("role '{}'", name)))
    }

    /// Active role group by name
    pub async fn group(&self, name: &str) -> Result<RoleGroup> {
        self.store
            .group_by_name(name)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("role group '{}'", name)))
    }

    /// Drop the cached roles of a principal after its assignments change
    pub fn invalidate_principal_cache(&self, principal: &PrincipalId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(principal);
        }
    }

    /// Drop cached principals that reached a group whose contents changed
    pub fn invalidate_group(&self, group: GroupId) -> usize {
        self.cache
            .as_ref()
            .map_or(0, |cache| cache.invalidate_group(group))
    }

    /// Drop every cached role set
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("Role cache cleared");
        }
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(PrincipalRoleCache::stats)
    }
}
