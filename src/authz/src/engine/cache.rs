//! Per-principal role set cache
//!
//! Each principal owns one slot holding a `tokio::sync::OnceCell`. The first
//! caller resolves and populates it; concurrent callers for the same
//! principal wait on that single resolution instead of racing the store.
//! A failed resolution drops its slot so the next caller retries.
//!
//! Entries live until invalidated. An optional TTL turns stale entries into
//! misses on access; nothing is refreshed in the background.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::roles::{Resolution, RoleSet};
use crate::types::{GroupId, PrincipalId};

/// Resolved roles of one principal
#[derive(Debug, Clone)]
struct CachedRoles {
    roles: Arc<RoleSet>,
    groups: BTreeSet<GroupId>,
    cached_at: Instant,
}

impl CachedRoles {
    fn new(resolution: Resolution) -> Self {
        Self {
            roles: Arc::new(resolution.roles),
            groups: resolution.groups,
            cached_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
struct CacheSlot {
    cell: OnceCell<CachedRoles>,
    created_at: Instant,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            created_at: Instant::now(),
        }
    }

    /// Age used for eviction: population time, or creation time while empty
    fn stamp(&self) -> Instant {
        self.cell.get().map_or(self.created_at, |c| c.cached_at)
    }
}

/// Principal role cache
pub struct PrincipalRoleCache {
    entries: DashMap<PrincipalId, Arc<CacheSlot>>,

    config: CacheConfig,

    stats: DashMap<String, usize>,
}

impl PrincipalRoleCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: DashMap::new(),
        }
    }

    /// Cached roles of a principal, resolving on a miss
    ///
    /// `resolve` runs at most once per principal at a time.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        principal: &PrincipalId,
        resolve: F,
    ) -> Result<Arc<RoleSet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resolution>>,
    {
        let slot = self.slot(principal);

        if let Some(cached) = slot.cell.get() {
            self.increment_stat("hits");
            trace!("Role cache hit for principal '{}'", principal);
            return Ok(cached.roles.clone());
        }

        self.increment_stat("misses");
        let result = slot
            .cell
            .get_or_try_init(|| async { resolve().await.map(CachedRoles::new) })
            .await;

        match result {
            Ok(cached) => Ok(cached.roles.clone()),
            Err(e) => {
                // An empty slot must not outlive the failed call
                self.entries.remove_if(principal, |_, current| {
                    Arc::ptr_eq(current, &slot) && current.cell.get().is_none()
                });
                Err(e)
            }
        }
    }

    /// Cached roles without resolving
    pub fn peek(&self, principal: &PrincipalId) -> Option<Arc<RoleSet>> {
        let slot = self.entries.get(principal)?;
        let cached = slot.cell.get()?;
        if self.is_expired(cached) {
            return None;
        }
        Some(cached.roles.clone())
    }

    /// Drop the cached roles of one principal
    pub fn invalidate(&self, principal: &PrincipalId) -> bool {
        let removed = self.entries.remove(principal).is_some();
        if removed {
            self.increment_stat("invalidations");
            debug!("Role cache invalidated for principal '{}'", principal);
        }
        removed
    }

    /// Drop every principal whose resolution expanded `group`
    ///
    /// In-flight resolutions are dropped too since they may have read the
    /// graph before the change.
    pub fn invalidate_group(&self, group: GroupId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot.cell.get() {
            Some(cached) => !cached.groups.contains(&group),
            None => false,
        });
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.add_stat("invalidations", removed);
            debug!("Role cache invalidated {} principals for group {}", removed, group);
        }
        removed
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            invalidations: self.get_stat("invalidations"),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    /// Slot for a principal, replacing an expired one
    fn slot(&self, principal: &PrincipalId) -> Arc<CacheSlot> {
        if let Some(slot) = self.entries.get(principal) {
            let expired = slot.cell.get().map_or(false, |c| self.is_expired(c));
            if !expired {
                return slot.value().clone();
            }
            drop(slot);
            let removed = self.entries.remove_if(principal, |_, slot| {
                slot.cell.get().map_or(false, |c| self.is_expired(c))
            });
            if removed.is_some() {
                self.increment_stat("expirations");
            }
        }

        if self.entries.len() >= self.config.capacity {
            self.evict_oldest();
        }

        self.entries
            .entry(principal.clone())
            .or_insert_with(|| Arc::new(CacheSlot::new()))
            .value()
            .clone()
    }

    fn is_expired(&self, cached: &CachedRoles) -> bool {
        self.config
            .ttl
            .map_or(false, |ttl| cached.cached_at.elapsed() > ttl)
    }

    /// Evict the oldest entries (about 10% of capacity)
    fn evict_oldest(&self) {
        let to_remove = (self.config.capacity / 10).max(1);

        let mut by_age: Vec<(PrincipalId, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stamp()))
            .collect();
        by_age.sort_by_key(|(_, stamp)| *stamp);

        for (principal, _) in by_age.into_iter().take(to_remove) {
            self.entries.remove(&principal);
        }
        trace!("Role cache evicted up to {} entries", to_remove);
    }

    fn increment_stat(&self, key: &str) {
        self.add_stat(key, 1);
    }

    fn add_stat(&self, key: &str, n: usize) {
        self.stats
            .entry(key.to_string())
            .and_modify(|count| *count += n)
            .or_insert(n);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub invalidations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::types::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn resolution(names: &[&str], groups: &[GroupId]) -> Resolution {
        Resolution {
            roles: names
                .iter()
                .enumerate()
                .map(|(i, n)| Role::new(i as i64 + 1, *n, ""))
                .collect(),
            groups: groups.iter().copied().collect(),
        }
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let cache = PrincipalRoleCache::new(CacheConfig::default());
        let alice = PrincipalId::new("alice");

        let roles = cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["edit_post"], &[])) })
            .await
            .unwrap();
        assert!(roles.contains("edit_post"));

        let again = cache
            .get_or_resolve(&alice, || async {
                Err(AuthzError::DatabaseError("must not resolve".into()))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&roles, &again));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_failed_resolution_not_cached() {
        let cache = PrincipalRoleCache::new(CacheConfig::default());
        let alice = PrincipalId::new("alice");

        let err = cache
            .get_or_resolve(&alice, || async { Err(AuthzError::NotFound("alice".into())) })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(cache.peek(&alice).is_none());

        let roles = cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["edit_post"], &[])) })
            .await
            .unwrap();
        assert_eq!(roles.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = PrincipalRoleCache::new(CacheConfig::default());
        let alice = PrincipalId::new("alice");

        cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["edit_post"], &[])) })
            .await
            .unwrap();
        assert!(cache.invalidate(&alice));
        assert!(!cache.invalidate(&alice));
        assert!(cache.peek(&alice).is_none());

        let roles = cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["publish_post"], &[])) })
            .await
            .unwrap();
        assert_eq!(roles.names(), vec!["publish_post"]);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_invalidate_group() {
        let cache = PrincipalRoleCache::new(CacheConfig::default());
        let alice = PrincipalId::new("alice");
        let bob = PrincipalId::new("bob");

        cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["edit_post"], &[1, 2])) })
            .await
            .unwrap();
        cache
            .get_or_resolve(&bob, || async { Ok(resolution(&["view_post"], &[3])) })
            .await
            .unwrap();

        assert_eq!(cache.invalidate_group(2), 1);
        assert!(cache.peek(&alice).is_none());
        assert!(cache.peek(&bob).is_some());
        assert_eq!(cache.invalidate_group(99), 0);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = PrincipalRoleCache::new(CacheConfig {
            ttl: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let alice = PrincipalId::new("alice");

        cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["edit_post"], &[])) })
            .await
            .unwrap();
        assert!(cache.peek(&alice).is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.peek(&alice).is_none());

        let roles = cache
            .get_or_resolve(&alice, || async { Ok(resolution(&["publish_post"], &[])) })
            .await
            .unwrap();
        assert!(roles.contains("publish_post"));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = PrincipalRoleCache::new(CacheConfig {
            capacity: 3,
            ..Default::default()
        });

        for name in ["p1", "p2", "p3", "p4"] {
            cache
                .get_or_resolve(&PrincipalId::new(name), || async {
                    Ok(resolution(&["edit_post"], &[]))
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(cache.stats().entries, 3);
        assert!(cache.peek(&PrincipalId::new("p1")).is_none());
        assert!(cache.peek(&PrincipalId::new("p4")).is_some());
    }

    #[tokio::test]
    async fn test_failed_resolutions_do_not_grow_cache() {
        let cache = PrincipalRoleCache::new(CacheConfig {
            capacity: 3,
            ..Default::default()
        });

        for i in 0..100 {
            let principal = PrincipalId::new(format!("ghost-{}", i));
            let err = cache
                .get_or_resolve(&principal, || async {
                    Err(AuthzError::NotFound("principal".into()))
                })
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }

        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_capacity_holds_with_mixed_outcomes() {
        let cache = PrincipalRoleCache::new(CacheConfig {
            capacity: 3,
            ..Default::default()
        });

        for i in 0..20 {
            let principal = PrincipalId::new(format!("p{}", i));
            let _ = cache
                .get_or_resolve(&principal, || async move {
                    if i % 2 == 0 {
                        Ok(resolution(&["edit_post"], &[]))
                    } else {
                        Err(AuthzError::NotFound("principal".into()))
                    }
                })
                .await;
            assert!(cache.stats().entries <= 3);
        }
    }

    #[tokio::test]
    async fn test_single_flight() {
        let cache = Arc::new(PrincipalRoleCache::new(CacheConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let alice = PrincipalId::new("alice");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(&alice, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(resolution(&["edit_post"], &[]))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().contains("edit_post"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
