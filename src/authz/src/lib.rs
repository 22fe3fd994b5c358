//! # Rolegraph Authorization Engine
//!
//! Role based authorization over nested role groups.
//!
//! ## Features
//!
//! - **Nested role groups** resolved depth-first with a cycle guard
//! - **Async-first design** using Tokio runtime
//! - **All / any membership checks** over role names or role objects
//! - **Per-principal caching** with single-flight resolution and explicit invalidation
//! - **Pluggable storage**: in-memory store, PostgreSQL behind the `postgres` feature
//!
//! ## Example
//!
//! ```rust
//! use rolegraph_authz::{InMemoryEntityStore, MatchMode, PrincipalId, RoleEngine, RoleQuery};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryEntityStore::new());
//!     let publish = store.create_role("publish_post", "Publish a post").await?;
//!     let editor = store.create_group("editor", "Edits and publishes posts").await?;
//!     store.attach_role(editor.id, publish.id).await?;
//!
//!     let alice = PrincipalId::new("alice");
//!     store.add_principal(alice.clone()).await;
//!     store.assign_group(&alice, editor.id).await?;
//!
//!     let engine = RoleEngine::new(store);
//!     let allowed = engine
//!         .has_role(&alice, &RoleQuery::from("publish_post"), MatchMode::All)
//!         .await?;
//!
//!     if allowed {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod roles;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{CacheConfig, EngineConfig, ResolverConfig};
pub use engine::{CacheStats, PrincipalRoleCache, RoleEngine};
pub use error::{AuthzError, Result};
pub use roles::{has_role, GroupResolver, MatchMode, RoleHolder, RoleQuery, RoleRef, RoleSet};
pub use store::{EntityStore, InMemoryEntityStore, Snapshot};
pub use types::{GroupId, PrincipalId, Role, RoleGroup, RoleId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
