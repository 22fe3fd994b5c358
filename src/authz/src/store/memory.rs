//! In-memory entity store
//!
//! Keeps roles, groups and assignment edges behind a tokio `RwLock`. Besides
//! the read-only [`EntityStore`] contract it offers the mutations a real
//! persistence layer would: create, attach, assign, revoke and soft-delete.
//! A [`Snapshot`] gives a name-based serde representation for fixtures.

use super::EntityStore;
use crate::error::{AuthzError, Result};
use crate::types::{GroupId, PrincipalId, Role, RoleGroup, RoleId};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<RoleId, Role>,
    groups: BTreeMap<GroupId, RoleGroup>,
    group_roles: HashMap<GroupId, BTreeSet<RoleId>>,
    group_children: HashMap<GroupId, BTreeSet<GroupId>>,
    principals: BTreeSet<PrincipalId>,
    principal_roles: HashMap<PrincipalId, BTreeSet<RoleId>>,
    principal_groups: HashMap<PrincipalId, BTreeSet<GroupId>>,
    next_role_id: RoleId,
    next_group_id: GroupId,
}

impl State {
    fn active_role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id).filter(|r| r.is_active())
    }

    fn active_group(&self, id: GroupId) -> Option<&RoleGroup> {
        self.groups.get(&id).filter(|g| g.is_active())
    }

    fn require_role(&self, id: RoleId) -> Result<&Role> {
        self.active_role(id)
            .ok_or_else(|| AuthzError::NotFound(format!("role {}", id)))
    }

    fn require_group(&self, id: GroupId) -> Result<&RoleGroup> {
        self.active_group(id)
            .ok_or_else(|| AuthzError::NotFound(format!("role group {}", id)))
    }

    fn require_principal(&self, principal: &PrincipalId) -> Result<()> {
        if self.principals.contains(principal) {
            Ok(())
        } else {
            Err(AuthzError::NotFound(format!("principal '{}'", principal)))
        }
    }

    fn roles_for(&self, ids: Option<&BTreeSet<RoleId>>) -> Vec<Role> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.active_role(*id).cloned())
            .collect()
    }

    fn groups_for(&self, ids: Option<&BTreeSet<GroupId>>) -> Vec<RoleGroup> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.active_group(*id).cloned())
            .collect()
    }

    fn insert_role(&mut self, role: Role) -> Result<Role> {
        role.validate()?;
        if self.roles.contains_key(&role.id) {
            return Err(AuthzError::InvalidArgument(format!(
                "Duplicate role id: {}",
                role.id
            )));
        }
        if self.roles.values().any(|r| r.name == role.name) {
            return Err(AuthzError::InvalidArgument(format!(
                "Duplicate role name: {}",
                role.name
            )));
        }
        self.next_role_id = self.next_role_id.max(role.id);
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn insert_group(&mut self, group: RoleGroup) -> Result<RoleGroup> {
        group.validate()?;
        if self.groups.contains_key(&group.id) {
            return Err(AuthzError::InvalidArgument(format!(
                "Duplicate role group id: {}",
                group.id
            )));
        }
        if self.groups.values().any(|g| g.name == group.name) {
            return Err(AuthzError::InvalidArgument(format!(
                "Duplicate role group name: {}",
                group.name
            )));
        }
        self.next_group_id = self.next_group_id.max(group.id);
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn role_id_by_name(&self, name: &str) -> Result<RoleId> {
        self.roles
            .values()
            .find(|r| r.name == name && r.is_active())
            .map(|r| r.id)
            .ok_or_else(|| AuthzError::NotFound(format!("role '{}'", name)))
    }

    fn group_id_by_name(&self, name: &str) -> Result<GroupId> {
        self.groups
            .values()
            .find(|g| g.name == name && g.is_active())
            .map(|g| g.id)
            .ok_or_else(|| AuthzError::NotFound(format!("role group '{}'", name)))
    }
}

/// In-memory entity store
#[derive(Clone, Default)]
pub struct InMemoryEntityStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryEntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a role with the next free id
    pub async fn create_role(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Role> {
        let mut state = self.state.write().await;
        let role = Role::new(state.next_role_id + 1, name, description);
        state.insert_role(role)
    }

    /// Create a role group with the next free id
    pub async fn create_group(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<RoleGroup> {
        let mut state = self.state.write().await;
        let group = RoleGroup::new(state.next_group_id + 1, name, description);
        state.insert_group(group)
    }

    /// Insert a role with a caller-chosen id
    pub async fn insert_role(&self, role: Role) -> Result<Role> {
        self.state.write().await.insert_role(role)
    }

    /// Insert a role group with a caller-chosen id
    pub async fn insert_group(&self, group: RoleGroup) -> Result<RoleGroup> {
        self.state.write().await.insert_group(group)
    }

    /// Attach a role to a group
    pub async fn attach_role(&self, group: GroupId, role: RoleId) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_group(group)?;
        state.require_role(role)?;
        state.group_roles.entry(group).or_default().insert(role);
        Ok(())
    }

    /// Detach a role from a group
    pub async fn detach_role(&self, group: GroupId, role: RoleId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .group_roles
            .get_mut(&group)
            .map(|roles| roles.remove(&role))
            .unwrap_or(false))
    }

    /// Add a containment edge `parent -> child`
    ///
    /// Cycles are accepted; the resolver guards against them.
    pub async fn add_child(&self, parent: GroupId, child: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_group(parent)?;
        state.require_group(child)?;
        state.group_children.entry(parent).or_default().insert(child);
        Ok(())
    }

    /// Remove a containment edge `parent -> child`
    pub async fn remove_child(&self, parent: GroupId, child: GroupId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .group_children
            .get_mut(&parent)
            .map(|children| children.remove(&child))
            .unwrap_or(false))
    }

    /// Register a principal
    pub async fn add_principal(&self, principal: impl Into<PrincipalId>) {
        self.state.write().await.principals.insert(principal.into());
    }

    /// Assign a role directly to a principal
    pub async fn assign_role(&self, principal: &PrincipalId, role: RoleId) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_principal(principal)?;
        state.require_role(role)?;
        state
            .principal_roles
            .entry(principal.clone())
            .or_default()
            .insert(role);
        Ok(())
    }

    /// Revoke a direct role assignment
    pub async fn revoke_role(&self, principal: &PrincipalId, role: RoleId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .principal_roles
            .get_mut(principal)
            .map(|roles| roles.remove(&role))
            .unwrap_or(false))
    }

    /// Assign a role group to a principal
    pub async fn assign_group(&self, principal: &PrincipalId, group: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_principal(principal)?;
        state.require_group(group)?;
        state
            .principal_groups
            .entry(principal.clone())
            .or_default()
            .insert(group);
        Ok(())
    }

    /// Revoke a role group assignment
    pub async fn revoke_group(&self, principal: &PrincipalId, group: GroupId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .principal_groups
            .get_mut(principal)
            .map(|groups| groups.remove(&group))
            .unwrap_or(false))
    }

    /// Soft-delete a role; edges referencing it are kept
    pub async fn soft_delete_role(&self, id: RoleId) -> Result<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get_mut(&id)
            .filter(|r| r.is_active())
            .ok_or_else(|| AuthzError::NotFound(format!("role {}", id)))?;
        let now = Utc::now();
        role.deleted_at = Some(now);
        role.updated_at = now;
        debug!("Soft-deleted role '{}'", role.name);
        Ok(())
    }

    /// Soft-delete a role group; edges referencing it are kept
    pub async fn soft_delete_group(&self, id: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get_mut(&id)
            .filter(|g| g.is_active())
            .ok_or_else(|| AuthzError::NotFound(format!("role group {}", id)))?;
        let now = Utc::now();
        group.deleted_at = Some(now);
        group.updated_at = now;
        debug!("Soft-deleted role group '{}'", group.name);
        Ok(())
    }

    /// Build a store from a name-based snapshot
    pub async fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            let now = Utc::now();

            for entry in &snapshot.roles {
                let mut role = Role::new(state.next_role_id + 1, &entry.name, &entry.description);
                if entry.deleted {
                    role.deleted_at = Some(now);
                }
                state.insert_role(role)?;
            }

            for entry in &snapshot.groups {
                let mut group =
                    RoleGroup::new(state.next_group_id + 1, &entry.name, &entry.description);
                if entry.deleted {
                    group.deleted_at = Some(now);
                }
                state.insert_group(group)?;
            }

            // Edges are resolved by name over every row, deleted or not,
            // so a snapshot can describe edges to soft-deleted entities.
            let role_ids: HashMap<String, RoleId> = state
                .roles
                .values()
                .map(|r| (r.name.clone(), r.id))
                .collect();
            let group_ids: HashMap<String, GroupId> = state
                .groups
                .values()
                .map(|g| (g.name.clone(), g.id))
                .collect();
            let lookup_role = |name: &String| {
                role_ids
                    .get(name)
                    .copied()
                    .ok_or_else(|| AuthzError::NotFound(format!("role '{}'", name)))
            };
            let lookup_group = |name: &String| {
                group_ids
                    .get(name)
                    .copied()
                    .ok_or_else(|| AuthzError::NotFound(format!("role group '{}'", name)))
            };

            for entry in &snapshot.groups {
                let id = lookup_group(&entry.name)?;
                for role in &entry.roles {
                    let role_id = lookup_role(role)?;
                    state.group_roles.entry(id).or_default().insert(role_id);
                }
                for child in &entry.children {
                    let child_id = lookup_group(child)?;
                    state.group_children.entry(id).or_default().insert(child_id);
                }
            }

            for entry in &snapshot.principals {
                let principal = PrincipalId::new(&entry.id);
                state.principals.insert(principal.clone());
                for role in &entry.roles {
                    let role_id = lookup_role(role)?;
                    state
                        .principal_roles
                        .entry(principal.clone())
                        .or_default()
                        .insert(role_id);
                }
                for group in &entry.groups {
                    let group_id = lookup_group(group)?;
                    state
                        .principal_groups
                        .entry(principal.clone())
                        .or_default()
                        .insert(group_id);
                }
            }

            debug!(
                "Loaded snapshot: {} roles, {} groups, {} principals",
                state.roles.len(),
                state.groups.len(),
                state.principals.len()
            );
        }
        Ok(store)
    }

    /// Export the store as a name-based snapshot
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        let role_name = |id: &RoleId| state.roles.get(id).map(|r| r.name.clone());
        let group_name = |id: &GroupId| state.groups.get(id).map(|g| g.name.clone());

        let roles = state
            .roles
            .values()
            .map(|r| SnapshotRole {
                name: r.name.clone(),
                description: r.description.clone(),
                deleted: !r.is_active(),
            })
            .collect();

        let groups = state
            .groups
            .values()
            .map(|g| SnapshotGroup {
                name: g.name.clone(),
                description: g.description.clone(),
                roles: state
                    .group_roles
                    .get(&g.id)
                    .into_iter()
                    .flatten()
                    .filter_map(role_name)
                    .collect(),
                children: state
                    .group_children
                    .get(&g.id)
                    .into_iter()
                    .flatten()
                    .filter_map(group_name)
                    .collect(),
                deleted: !g.is_active(),
            })
            .collect();

        let principals = state
            .principals
            .iter()
            .map(|p| SnapshotPrincipal {
                id: p.as_str().to_string(),
                roles: state
                    .principal_roles
                    .get(p)
                    .into_iter()
                    .flatten()
                    .filter_map(role_name)
                    .collect(),
                groups: state
                    .principal_groups
                    .get(p)
                    .into_iter()
                    .flatten()
                    .filter_map(group_name)
                    .collect(),
            })
            .collect();

        Snapshot {
            roles,
            groups,
            principals,
        }
    }

    /// Look up an active role id by name
    pub async fn role_id(&self, name: &str) -> Result<RoleId> {
        self.state.read().await.role_id_by_name(name)
    }

    /// Look up an active group id by name
    pub async fn group_id(&self, name: &str) -> Result<GroupId> {
        self.state.read().await.group_id_by_name(name)
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .find(|r| r.name == name && r.is_active())
            .cloned())
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<RoleGroup>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .values()
            .find(|g| g.name == name && g.is_active())
            .cloned())
    }

    async fn group(&self, id: GroupId) -> Result<Option<RoleGroup>> {
        Ok(self.state.read().await.active_group(id).cloned())
    }

    async fn principal_exists(&self, principal: &PrincipalId) -> Result<bool> {
        Ok(self.state.read().await.principals.contains(principal))
    }

    async fn roles_assigned_to(&self, principal: &PrincipalId) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state.roles_for(state.principal_roles.get(principal)))
    }

    async fn groups_assigned_to(&self, principal: &PrincipalId) -> Result<Vec<RoleGroup>> {
        let state = self.state.read().await;
        Ok(state.groups_for(state.principal_groups.get(principal)))
    }

    async fn roles_of(&self, group: GroupId) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state.roles_for(state.group_roles.get(&group)))
    }

    async fn children_of(&self, group: GroupId) -> Result<Vec<RoleGroup>> {
        let state = self.state.read().await;
        Ok(state.groups_for(state.group_children.get(&group)))
    }
}

/// Name-based store snapshot
///
/// ```json
/// {
///   "roles": [{ "name": "edit_post", "description": "Edit any post" }],
///   "groups": [{ "name": "editor", "description": "Edits posts", "roles": ["edit_post"] }],
///   "principals": [{ "id": "42", "groups": ["editor"] }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub roles: Vec<SnapshotRole>,
    #[serde(default)]
    pub groups: Vec<SnapshotGroup>,
    #[serde(default)]
    pub principals: Vec<SnapshotPrincipal>,
}

impl Snapshot {
    /// Parse a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AuthzError::InvalidArgument(format!("Invalid snapshot: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPrincipal {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = InMemoryEntityStore::new();
        let role = store.create_role("edit_post", "Edit any post").await.unwrap();
        let group = store.create_group("editor", "Edits posts on the blog").await.unwrap();

        assert_eq!(store.role_by_name("edit_post").await.unwrap(), Some(role.clone()));
        assert_eq!(store.group(group.id).await.unwrap(), Some(group.clone()));
        assert!(store.group_by_name("missing").await.unwrap().is_none());

        store.attach_role(group.id, role.id).await.unwrap();
        assert_eq!(store.roles_of(group.id).await.unwrap(), vec![role]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_and_duplicate_names() {
        let store = InMemoryEntityStore::new();
        assert!(store.create_role("Bad-Name", "x").await.is_err());
        store.create_role("edit_post", "Edit").await.unwrap();
        assert!(store.create_role("edit_post", "Again").await.is_err());
        assert!(store.create_group("editor", "short").await.is_err());
    }

    #[tokio::test]
    async fn test_soft_deleted_entities_hidden() {
        let store = InMemoryEntityStore::new();
        let role = store.create_role("edit_post", "Edit any post").await.unwrap();
        let group = store.create_group("editor", "Edits posts on the blog").await.unwrap();
        store.attach_role(group.id, role.id).await.unwrap();

        store.soft_delete_role(role.id).await.unwrap();
        assert!(store.roles_of(group.id).await.unwrap().is_empty());
        assert!(store.role_by_name("edit_post").await.unwrap().is_none());
        assert!(store.soft_delete_role(role.id).await.unwrap_err().is_not_found());

        store.soft_delete_group(group.id).await.unwrap();
        assert!(store.group(group.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assignments_require_principal() {
        let store = InMemoryEntityStore::new();
        let role = store.create_role("edit_post", "Edit any post").await.unwrap();
        let alice = PrincipalId::new("alice");

        assert!(store.assign_role(&alice, role.id).await.unwrap_err().is_not_found());

        store.add_principal(alice.clone()).await;
        store.assign_role(&alice, role.id).await.unwrap();
        assert_eq!(store.roles_assigned_to(&alice).await.unwrap().len(), 1);

        assert!(store.revoke_role(&alice, role.id).await.unwrap());
        assert!(store.roles_assigned_to(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let json = r#"{
            "roles": [
                { "name": "edit_post", "description": "Edit any post" },
                { "name": "publish_post", "description": "Publish posts" },
                { "name": "old_role", "deleted": true }
            ],
            "groups": [
                { "name": "editor", "description": "Edits posts on the blog", "roles": ["edit_post", "old_role"] },
                { "name": "senior_editor", "description": "Edits and publishes posts",
                  "roles": ["publish_post"], "children": ["editor"] }
            ],
            "principals": [{ "id": "u1", "groups": ["senior_editor"] }]
        }"#;

        let snapshot = Snapshot::from_json(json).unwrap();
        let store = InMemoryEntityStore::from_snapshot(snapshot.clone()).await.unwrap();

        let editor = store.group_id("editor").await.unwrap();
        let names: Vec<String> = store
            .roles_of(editor)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["edit_post"]);

        assert_eq!(store.snapshot().await, snapshot);
    }

    #[tokio::test]
    async fn test_snapshot_unknown_reference() {
        let snapshot = Snapshot::from_json(
            r#"{ "principals": [{ "id": "u1", "roles": ["ghost_role"] }] }"#,
        )
        .unwrap();
        let err = InMemoryEntityStore::from_snapshot(snapshot).await.err().unwrap();
        assert!(err.is_not_found());
    }
}
