//! Core entity types

use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique role identifier
pub type RoleId = i64;

/// Unique role group identifier
pub type GroupId = i64;

/// Minimum length of a role or group name
pub const MIN_NAME_LEN: usize = 3;

/// Maximum length of a role or group name
pub const MAX_NAME_LEN: usize = 50;

/// Role group descriptions must be longer than this
pub const MIN_GROUP_DESCRIPTION_LEN: usize = 10;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+(_[a-z]+)*$").expect("name pattern is valid"));

/// Validate a role or group name
///
/// Names are lower case words separated by single underscores,
/// between 3 and 50 characters long.
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(AuthzError::InvalidArgument(format!(
            "Name '{}' must be between {} and {} characters",
            name, MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }

    if !NAME_PATTERN.is_match(name) {
        return Err(AuthzError::InvalidArgument(format!(
            "Name '{}' can contain only lower case a-z separated by single underscores",
            name
        )));
    }

    Ok(())
}

/// Opaque principal identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a principal id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// An atomic named permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Store identifier
    pub id: RoleId,

    /// Unique role name (e.g., "edit_post")
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    /// Create a new active role
    pub fn new(id: RoleId, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the role has not been soft-deleted
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Validate the role definition
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

/// A named collection of roles and nested role groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGroup {
    /// Store identifier
    pub id: GroupId,

    /// Unique group name (e.g., "senior_editor")
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RoleGroup {
    /// Create a new active role group
    pub fn new(id: GroupId, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the group has not been soft-deleted
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Validate the group definition
    ///
    /// Group descriptions must be longer than 10 characters.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;

        if self.description.chars().count() <= MIN_GROUP_DESCRIPTION_LEN {
            return Err(AuthzError::InvalidArgument(format!(
                "Description of role group '{}' must be longer than {} characters",
                self.name, MIN_GROUP_DESCRIPTION_LEN
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("edit_post").is_ok());
        assert!(validate_name("abc").is_ok());
        assert!(validate_name("role_manager").is_ok());
        assert!(validate_name(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("ab").is_err());
        assert!(validate_name(&"a".repeat(51)).is_err());
        assert!(validate_name("Edit_post").is_err());
        assert!(validate_name("edit__post").is_err());
        assert!(validate_name("_edit").is_err());
        assert!(validate_name("edit_").is_err());
        assert!(validate_name("edit-post").is_err());
        assert!(validate_name("post2").is_err());
    }

    #[test]
    fn test_group_description_rule() {
        let group = RoleGroup::new(1, "editor", "Can edit posts");
        assert!(group.validate().is_ok());

        let short = RoleGroup::new(2, "editor", "0123456789");
        assert!(short.validate().unwrap_err().is_invalid_argument());

        // Roles carry no description constraint
        let role = Role::new(1, "edit_post", "");
        assert!(role.validate().is_ok());
    }

    #[test]
    fn test_principal_id_conversions() {
        assert_eq!(PrincipalId::from(42).as_str(), "42");
        assert_eq!(PrincipalId::from("user:alice").to_string(), "user:alice");

        let json = serde_json::to_string(&PrincipalId::new("u1")).unwrap();
        assert_eq!(json, "\"u1\"");
    }

    #[test]
    fn test_soft_delete_flag() {
        let mut role = Role::new(1, "edit_post", "Edit posts");
        assert!(role.is_active());
        role.deleted_at = Some(Utc::now());
        assert!(!role.is_active());
    }
}
