//! # permit-engine: user-centric orchestration
//!
//! Turns user operations into store operations and, for new users, a full
//! credential issuance:
//!
//! | Operation            | Effect                                                   |
//! |----------------------|----------------------------------------------------------|
//! | `create_user`        | Issues a client certificate; grants nothing              |
//! | `grant_role`         | Creates one binding under a deterministic name           |
//! | `revoke_role`        | Deletes (or trims) the bindings granting the role        |
//! | `delete_user`        | Removes the user from every binding, drops its CSR       |
//! | `create_role`        | Creates a Role or ClusterRole, conflict-checked          |
//! | `provision_user`     | `create_user` plus an [`AccessPlan`] of template grants  |
//!
//! Nothing is transactional. Every step is idempotent, so repeating an
//! operation that failed part way converges on the same end state.
//!
//! ## Example
//!
//! ```no_run
//! use permit_engine::{Engine, IssuerConfig};
//! use permit_store::memory::MemoryCluster;
//! use permit_types::{RoleRef, Scope};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> permit_engine::Result<()> {
//! let engine = Engine::for_cluster(MemoryCluster::new("dev"), IssuerConfig::default());
//! engine.install_templates().await?;
//!
//! let bundle = engine.create_user("alice", &CancellationToken::new()).await?;
//! engine
//!     .grant_role(
//!         "alice",
//!         &RoleRef::cluster_role("template-cluster-resources___read-only"),
//!         &Scope::Cluster,
//!     )
//!     .await?;
//! let kubeconfig = engine.kubeconfig_for(&bundle, None)?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
pub mod templates;

pub use engine::{
    DEFAULT_APPROVAL_TIMEOUT, Engine, GrantOutcome, Provisioned, Removal, RoleFilter, UserSummary,
};
pub use error::{EngineError, Result};
pub use permit_issuer::{ApprovalMode, IssuerConfig};
pub use templates::{AccessPlan, ClusterAccess, NamespaceSelection, NamespaceTemplate};
