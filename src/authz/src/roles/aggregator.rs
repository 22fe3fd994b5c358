//! Principal role aggregation
//!
//! Anything that can list its direct roles and direct groups is a
//! [`RoleHolder`]. Its effective role set is the direct roles plus the
//! closure of every assigned group.

use super::resolver::{GroupResolver, Resolution, Traversal};
use super::set::RoleSet;
use crate::error::{AuthzError, Result};
use crate::store::EntityStore;
use crate::types::{PrincipalId, Role, RoleGroup};
use async_trait::async_trait;
use tracing::debug;

/// Capability: supplies direct role and group grants
#[async_trait]
pub trait RoleHolder: Send + Sync {
    /// Roles granted directly
    async fn direct_roles(&self) -> Result<Vec<Role>>;

    /// Role groups granted directly
    async fn direct_groups(&self) -> Result<Vec<RoleGroup>>;
}

/// A principal whose grants are read from an [`EntityStore`]
pub struct StorePrincipal<'a> {
    store: &'a dyn EntityStore,
    id: &'a PrincipalId,
}

impl<'a> StorePrincipal<'a> {
    pub fn new(store: &'a dyn EntityStore, id: &'a PrincipalId) -> Self {
        Self { store, id }
    }
}

#[async_trait]
impl RoleHolder for StorePrincipal<'_> {
    async fn direct_roles(&self) -> Result<Vec<Role>> {
        self.store.roles_assigned_to(self.id).await
    }

    async fn direct_groups(&self) -> Result<Vec<RoleGroup>> {
        self.store.groups_assigned_to(self.id).await
    }
}

/// Grants already loaded by the caller (e.g. from a session or token)
#[derive(Debug, Clone, Default)]
pub struct DirectGrants {
    pub roles: Vec<Role>,
    pub groups: Vec<RoleGroup>,
}

#[async_trait]
impl RoleHolder for DirectGrants {
    async fn direct_roles(&self) -> Result<Vec<Role>> {
        Ok(self.roles.clone())
    }

    async fn direct_groups(&self) -> Result<Vec<RoleGroup>> {
        Ok(self.groups.clone())
    }
}

impl GroupResolver {
    /// Effective roles of a principal known to the store
    ///
    /// # Errors
    ///
    /// `NotFound` if the store does not know the principal.
    pub async fn resolve_all_roles(&self, principal: &PrincipalId) -> Result<RoleSet> {
        Ok(self.resolve_principal_traced(principal).await?.roles)
    }

    /// Effective roles of a principal, with the ids of expanded groups
    pub async fn resolve_principal_traced(&self, principal: &PrincipalId) -> Result<Resolution> {
        if !self.store().principal_exists(principal).await? {
            return Err(AuthzError::NotFound(format!("principal '{}'", principal)));
        }

        let holder = StorePrincipal::new(self.store(), principal);
        let resolution = self.resolve_holder(&holder).await?;

        debug!(
            "Resolved {} roles for principal '{}' ({} groups expanded)",
            resolution.roles.len(),
            principal,
            resolution.groups.len()
        );

        Ok(resolution)
    }

    /// Effective roles of any role holder
    ///
    /// Direct roles seed the set and win on name collision; every assigned
    /// group is then expanded with one shared visited set.
    pub async fn resolve_holder(&self, holder: &dyn RoleHolder) -> Result<Resolution> {
        let mut roles: RoleSet = holder
            .direct_roles()
            .await?
            .into_iter()
            .filter(|role| role.is_active())
            .collect();

        let mut traversal = Traversal::new(*self.config());
        for group in holder.direct_groups().await? {
            self.expand(&group, &mut traversal, &mut roles).await?;
        }

        let groups = traversal.finish()?;
        Ok(Resolution { roles, groups })
    }
}
