//! Role graph resolution and membership queries
//!
//! Provides transitive role resolution over nested role groups, a
//! deduplicated role set, and all/any membership evaluation.
//!
//! # Features
//!
//! - **Depth-first resolution** with a per-call visited set (cycle safe)
//! - **Traversal bounds**: configurable depth and group budget
//! - **Capability trait**: any [`RoleHolder`] can be resolved
//! - **Short-circuit group checks**: [`GroupResolver::group_has_role`]
//!
//! # Example
//!
//! ```rust
//! use rolegraph_authz::roles::{has_role, GroupResolver, MatchMode, RoleQuery};
//! use rolegraph_authz::store::InMemoryEntityStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryEntityStore::new());
//! let edit = store.create_role("edit_post", "Edit any post").await?;
//! let editor = store.create_group("editor", "Edits posts on the blog").await?;
//! store.attach_role(editor.id, edit.id).await?;
//!
//! let resolver = GroupResolver::new(store.clone());
//! let roles = resolver.resolve_group_roles(editor.id).await?;
//!
//! assert!(has_role(&roles, &RoleQuery::from("edit_post"), MatchMode::All)?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod query;
pub mod resolver;
pub mod set;


pub use aggregator::{DirectGrants, RoleHolder, StorePrincipal};
pub use query::{has_role, MatchMode, RoleQuery, RoleRef};
pub use resolver::{GroupResolver, Resolution};
pub use set::RoleSet;
