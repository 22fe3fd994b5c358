//! Role graph resolver
//!
//! Walks the group containment graph depth-first and collects every role
//! reachable from a starting group. The graph is expected to be acyclic but
//! nothing relies on it:
//!
//! - **Cycle guard**: a group already expanded during the current call is
//!   skipped, so `A -> B -> A` terminates with the roles of both groups.
//! - **Bounds**: `max_depth` and `max_groups` from [`ResolverConfig`] cap
//!   pathological graphs with [`AuthzError::TraversalLimit`]. Depth is the
//!   shortest path from the seed, so child order never decides the outcome.
//! - **Soft deletes**: inactive groups and roles are dropped even when an
//!   edge still points at them.

use super::query::RoleQuery;
use super::set::RoleSet;
use crate::config::ResolverConfig;
use crate::error::{AuthzError, Result};
use crate::store::EntityStore;
use crate::types::{GroupId, RoleGroup};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Roles reached by one resolution plus the groups expanded on the way
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub roles: RoleSet,
    pub groups: BTreeSet<GroupId>,
}

/// Per-call traversal bookkeeping
///
/// Records the shortest depth each group was reached at. A group reached
/// again by a strictly shorter path is expanded again, so the depth bound
/// applies to shortest paths and does not depend on child order.
#[derive(Debug)]
pub(crate) struct Traversal {
    depths: HashMap<GroupId, usize>,
    config: ResolverConfig,
}

impl Traversal {
    pub(crate) fn new(config: ResolverConfig) -> Self {
        Self {
            depths: HashMap::new(),
            config,
        }
    }

    /// Record a group at `depth`; true if it should be expanded
    fn enter(&mut self, group: GroupId, depth: usize) -> Result<bool> {
        match self.depths.get(&group) {
            Some(&known) if known <= depth => {
                trace!("Group {} already expanded, skipping", group);
                return Ok(false);
            }
            Some(_) => trace!("Group {} reached by a shorter path at depth {}", group, depth),
            None => {
                if self.depths.len() >= self.config.max_groups {
                    warn!("Group budget of {} exhausted at group {}", self.config.max_groups, group);
                    return Err(AuthzError::TraversalLimit(format!(
                        "more than {} groups reachable",
                        self.config.max_groups
                    )));
                }
            }
        }

        self.depths.insert(group, depth);
        // Too deep for now; a shorter path may still bring it in range
        Ok(depth <= self.config.max_depth)
    }

    /// Whether reaching `group` at `depth` would improve on what is known
    fn improves(&self, group: GroupId, depth: usize) -> bool {
        self.depths.get(&group).map_or(true, |&known| depth < known)
    }

    /// Fail if any group is only reachable below the depth bound
    fn check_depth(&self) -> Result<()> {
        let deepest = self
            .depths
            .iter()
            .filter(|(_, depth)| **depth > self.config.max_depth)
            .min_by_key(|(group, _)| **group);

        match deepest {
            Some((group, _)) => {
                warn!("Group {} exceeds max depth {}", group, self.config.max_depth);
                Err(AuthzError::TraversalLimit(format!(
                    "group {} is nested deeper than {} levels",
                    group, self.config.max_depth
                )))
            }
            None => Ok(()),
        }
    }

    /// Expanded group ids, once every group is within the depth bound
    pub(crate) fn finish(self) -> Result<BTreeSet<GroupId>> {
        self.check_depth()?;
        Ok(self.depths.into_keys().collect())
    }
}

/// Resolves the transitive role closure of role groups
#[derive(Clone)]
pub struct GroupResolver {
    store: Arc<dyn EntityStore>,
    config: ResolverConfig,
}

impl GroupResolver {
    /// Create a resolver with default bounds
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    /// Create a resolver with custom bounds
    pub fn with_config(store: Arc<dyn EntityStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    /// All roles reachable from a group
    ///
    /// # Errors
    ///
    /// `NotFound` if the group does not exist or is soft-deleted.
    pub async fn resolve_group_roles(&self, group: GroupId) -> Result<RoleSet> {
        Ok(self.resolve_group_roles_traced(group).await?.roles)
    }

    /// All roles reachable from a group, with the ids of expanded groups
    pub async fn resolve_group_roles_traced(&self, group: GroupId) -> Result<Resolution> {
        let seed = self.require_group(group).await?;

        let mut traversal = Traversal::new(self.config);
        let mut roles = RoleSet::new();
        self.expand(&seed, &mut traversal, &mut roles).await?;

        let groups = traversal.finish()?;
        debug!(
            "Resolved {} roles from group '{}' ({} groups expanded)",
            roles.len(),
            seed.name,
            groups.len()
        );

        Ok(Resolution { roles, groups })
    }

    /// Whether a group holds any of the requested roles, directly or nested
    ///
    /// Checks the group's own roles first and then descends into children,
    /// returning on the first match without building the full closure.
    pub async fn group_has_role(&self, group: GroupId, query: &RoleQuery) -> Result<bool> {
        let names = query.names()?;
        let seed = self.require_group(group).await?;

        let mut traversal = Traversal::new(self.config);
        let mut stack = vec![(seed.id, 0usize)];

        while let Some((current, depth)) = stack.pop() {
            if !traversal.enter(current, depth)? {
                continue;
            }

            let roles = self.store.roles_of(current).await?;
            if roles
                .iter()
                .any(|role| role.is_active() && names.contains(&role.name))
            {
                debug!("Group '{}' holds one of {:?} via group {}", seed.name, names, current);
                return Ok(true);
            }

            let children = self.store.children_of(current).await?;
            self.push_children(&mut stack, &traversal, children, depth);
        }

        traversal.check_depth()?;
        Ok(false)
    }

    /// Expand `seed` into `roles`, sharing `traversal` with other seeds
    pub(crate) async fn expand(
        &self,
        seed: &RoleGroup,
        traversal: &mut Traversal,
        roles: &mut RoleSet,
    ) -> Result<()> {
        if !seed.is_active() {
            trace!("Skipping soft-deleted group '{}'", seed.name);
            return Ok(());
        }

        let mut stack = vec![(seed.id, 0usize)];

        while let Some((current, depth)) = stack.pop() {
            if !traversal.enter(current, depth)? {
                continue;
            }

            let direct = self.store.roles_of(current).await?;
            roles.extend(direct.into_iter().filter(|role| role.is_active()));

            let children = self.store.children_of(current).await?;
            self.push_children(&mut stack, traversal, children, depth);
        }

        Ok(())
    }

    fn push_children(
        &self,
        stack: &mut Vec<(GroupId, usize)>,
        traversal: &Traversal,
        children: Vec<RoleGroup>,
        depth: usize,
    ) {
        // Reversed so the first child is expanded first
        for child in children.into_iter().rev() {
            if !child.is_active() {
                trace!("Skipping soft-deleted group '{}'", child.name);
                continue;
            }
            if !traversal.improves(child.id, depth + 1) {
                trace!("Group '{}' already expanded, edge skipped", child.name);
                continue;
            }
            stack.push((child.id, depth + 1));
        }
    }

    async fn require_group(&self, group: GroupId) -> Result<RoleGroup> {
        match self.store.group(group).await? {
            Some(found) if found.is_active() => Ok(found),
            _ => Err(AuthzError::NotFound(format!("role group {}", group))),
        }
    }
}
