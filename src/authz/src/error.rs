//! Error types for the role resolution engine

use thiserror::Error;

/// Role engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Principal, role or group does not resolve to an active entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input (query shape, match mode, names, configuration)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Principal lacks the requested roles
    #[error("Permission denied: principal '{principal}' lacks {required}")]
    PermissionDenied {
        principal: String,
        required: String,
    },

    /// Traversal exceeded the configured depth or group budget
    #[error("Traversal limit exceeded: {0}")]
    TraversalLimit(String),

    /// Entity store or database failure
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AuthzError {
    /// Returns true for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for `InvalidArgument`
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result type for role engine operations
pub type Result<T> = std::result::Result<T, AuthzError>;
