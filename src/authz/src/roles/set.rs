//! Deduplicated role set keyed by role name

use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::{Entry, HashMap};
use std::collections::HashSet;

/// Result of a resolution: role name -> role
///
/// Names are unique. Inserting a name that is already present keeps the
/// existing entry, so roles added first (direct assignments) win over the
/// same name reached later through a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: HashMap<String, Role>,
}

impl RoleSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a role, returns false if the name was already present
    pub fn insert(&mut self, role: Role) -> bool {
        match self.roles.entry(role.name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(role);
                true
            }
        }
    }

    /// Merge another set, keeping existing entries on name collision
    pub fn merge(&mut self, other: RoleSet) {
        for (name, role) in other.roles {
            self.roles.entry(name).or_insert(role);
        }
    }

    /// Whether a role with this name is present
    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    /// Get a role by name
    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Role names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Role names as a set
    pub fn name_set(&self) -> HashSet<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    /// Iterate over the roles in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Whether every name in `other` is present here
    pub fn is_superset_of(&self, other: &RoleSet) -> bool {
        other.roles.keys().all(|name| self.roles.contains_key(name))
    }
}

impl Extend<Role> for RoleSet {
    fn extend<I: IntoIterator<Item = Role>>(&mut self, iter: I) {
        for role in iter {
            self.insert(role);
        }
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for RoleSet {
    type Item = Role;
    type IntoIter = std::collections::hash_map::IntoValues<String, Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.roles.into_values()
    }
}
