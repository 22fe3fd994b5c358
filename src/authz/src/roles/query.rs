//! Membership queries: requested role names and match semantics

use super::set::RoleSet;
use crate::error::{AuthzError, Result};
use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A reference to a role, by name or by entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    Name(String),
    Role(Role),
}

impl RoleRef {
    /// The referenced role name
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Role(role) => &role.name,
        }
    }
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for RoleRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for RoleRef {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<Role> for RoleRef {
    fn from(role: Role) -> Self {
        Self::Role(role)
    }
}

impl From<&Role> for RoleRef {
    fn from(role: &Role) -> Self {
        Self::Role(role.clone())
    }
}

/// Requested roles: a single reference or a list of references
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleQuery {
    One(RoleRef),
    Many(Vec<RoleRef>),
}

impl RoleQuery {
    /// Normalize to a deduplicated set of names
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the list is empty, or any name is empty or
    /// carries leading or trailing whitespace.
    pub fn names(&self) -> Result<BTreeSet<String>> {
        let refs: &[RoleRef] = match self {
            Self::One(role) => std::slice::from_ref(role),
            Self::Many(roles) => roles,
        };

        if refs.is_empty() {
            return Err(AuthzError::InvalidArgument(
                "Role query must name at least one role".to_string(),
            ));
        }

        refs.iter()
            .map(|r| {
                let name = r.name();
                if name.is_empty() {
                    Err(AuthzError::InvalidArgument(
                        "Role query contains an empty role name".to_string(),
                    ))
                } else if name.trim() != name {
                    Err(AuthzError::InvalidArgument(format!(
                        "Role name {:?} has surrounding whitespace",
                        name
                    )))
                } else {
                    Ok(name.to_string())
                }
            })
            .collect()
    }
}

impl From<RoleRef> for RoleQuery {
    fn from(role: RoleRef) -> Self {
        Self::One(role)
    }
}

impl From<&str> for RoleQuery {
    fn from(name: &str) -> Self {
        Self::One(name.into())
    }
}

impl From<String> for RoleQuery {
    fn from(name: String) -> Self {
        Self::One(name.into())
    }
}

impl From<Role> for RoleQuery {
    fn from(role: Role) -> Self {
        Self::One(role.into())
    }
}

impl From<&Role> for RoleQuery {
    fn from(role: &Role) -> Self {
        Self::One(role.into())
    }
}

impl<T: Into<RoleRef>> From<Vec<T>> for RoleQuery {
    fn from(roles: Vec<T>) -> Self {
        roles.into_iter().collect()
    }
}

impl<T: Into<RoleRef>, const N: usize> From<[T; N]> for RoleQuery {
    fn from(roles: [T; N]) -> Self {
        roles.into_iter().collect()
    }
}

impl<T: Into<RoleRef>> FromIterator<T> for RoleQuery {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Many(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for RoleQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(role) => write!(f, "role '{}'", role.name()),
            Self::Many(roles) => {
                let names: Vec<&str> = roles.iter().map(RoleRef::name).collect();
                write!(f, "roles [{}]", names.join(", "))
            }
        }
    }
}

/// Query semantics over the requested names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every requested name must be held
    #[default]
    All,
    /// At least one requested name must be held
    Any,
}

impl FromStr for MatchMode {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            other => Err(AuthzError::InvalidArgument(format!(
                "Match mode must be \"all\" or \"any\", got \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// Evaluate a query against a resolved role set
pub fn has_role(roles: &RoleSet, query: &RoleQuery, mode: MatchMode) -> Result<bool> {
    let names = query.names()?;
    Ok(matches_names(roles, &names, mode))
}

pub(crate) fn matches_names(roles: &RoleSet, names: &BTreeSet<String>, mode: MatchMode) -> bool {
    match mode {
        MatchMode::All => names.iter().all(|name| roles.contains(name)),
        MatchMode::Any => names.iter().any(|name| roles.contains(name)),
    }
}
