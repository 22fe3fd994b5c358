//! Entity store abstraction
//!
//! The engine never owns persistence. It reads roles, groups and assignment
//! edges through [`EntityStore`]; implementations decide how they are kept.

use crate::error::Result;
use crate::types::{GroupId, PrincipalId, Role, RoleGroup};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryEntityStore, Snapshot};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresEntityStore, PostgresStoreConfig};

/// Read access to roles, role groups and their assignment edges
///
/// Lookups only return active (non soft-deleted) entities. Edge queries on a
/// group or principal that does not exist return an empty list.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Get an active role by name
    async fn role_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// Get an active role group by name
    async fn group_by_name(&self, name: &str) -> Result<Option<RoleGroup>>;

    /// Get an active role group by id
    async fn group(&self, id: GroupId) -> Result<Option<RoleGroup>>;

    /// Whether the principal is known to the store
    async fn principal_exists(&self, principal: &PrincipalId) -> Result<bool>;

    /// Roles assigned directly to a principal
    async fn roles_assigned_to(&self, principal: &PrincipalId) -> Result<Vec<Role>>;

    /// Role groups assigned directly to a principal
    async fn groups_assigned_to(&self, principal: &PrincipalId) -> Result<Vec<RoleGroup>>;

    /// Roles attached directly to a group (not recursive)
    async fn roles_of(&self, group: GroupId) -> Result<Vec<Role>>;

    /// Child groups of a group (not recursive)
    async fn children_of(&self, group: GroupId) -> Result<Vec<RoleGroup>>;
}
