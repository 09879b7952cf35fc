//! # permit
//!
//! Identity and permission orchestration for Kubernetes.
//!
//! permit keeps no database. Users are client certificates issued through
//! the cluster's certificate API plus the RBAC bindings that name them;
//! everything permit knows it reads back from the cluster.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Engine                            │
//! │   ┌─────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │   │   Issuer    │   │ Permission   │   │  Templates   │  │
//! │   │ (CSR state  │   │   Graph      │   │  (built-in   │  │
//! │   │  machine)   │   │ (per query)  │   │ ClusterRoles)│  │
//! │   └──────┬──────┘   └──────┬───────┘   └──────────────┘  │
//! │          └────────┬────────┘                             │
//! │           ┌───────┴────────┐                             │
//! │           │     Store      │  Kubernetes / in-memory     │
//! │           └────────────────┘                             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use permit::{PermitConfig, RoleRef, Scope, connect};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> permit::Result<()> {
//! let config = PermitConfig::load()?;
//! let engine = connect(&config).await?;
//!
//! let bundle = engine.create_user("alice", &CancellationToken::new()).await?;
//! engine
//!     .grant_role("alice", &RoleRef::cluster_role("view"), &Scope::namespace("dev"))
//!     .await?;
//! let kubeconfig = engine.kubeconfig_for(&bundle, Some("dev"))?;
//! # Ok(())
//! # }
//! ```

mod connect;
mod error;

pub use connect::{connect, in_memory, issuer_config, kube_settings};
pub use error::{PermitError, Result};

// Engine
pub use permit_engine::{
    AccessPlan, ApprovalMode, ClusterAccess, DEFAULT_APPROVAL_TIMEOUT, Engine, EngineError,
    GrantOutcome, IssuerConfig, NamespaceSelection, NamespaceTemplate, Provisioned, Removal,
    RoleFilter, UserSummary, templates,
};

// Configuration
pub use permit_config::{ConfigError, ConfigLoader, LogFormat, LoggingSettings, PermitConfig};

// Graph
pub use permit_graph::{AccessQuery, BindingEntry, Grant, PermissionGraph, Resolution};

// Issuance
pub use permit_issuer::{IssuanceStage, IssueError, kubeconfig};

// Store
pub use permit_store::memory::MemoryCluster;
pub use permit_store::{
    CertificateApi, CreateOutcome, KubeSettings, KubeStore, ListScope, RbacStore, StoreError,
};

// Vocabulary
pub use permit_types::{
    Binding, BindingKey, ClusterInfo, CredentialBundle, ObjectKind, ObjectRef, PolicyRule, Role,
    RoleKey, RoleKind, RoleRef, Scope, Subject, SubjectKind, UserName,
};
