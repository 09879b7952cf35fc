//! # permit-store: RBAC object store adapter
//!
//! Typed access to the orchestration system's RBAC objects and certificate
//! API. This is the only layer that performs I/O; it holds no policy and no
//! cache.
//!
//! ## Contract
//!
//! - **create** is idempotent: an existing object with an equivalent
//!   definition is success ([`CreateOutcome::AlreadyExists`]); one with a
//!   different definition is [`StoreError::Conflict`] and is left untouched.
//! - **delete** is idempotent: deleting a missing object is success.
//! - **list** returns a lazy, finite [`ObjectStream`]. Pagination is handled
//!   inside the stream; every call starts a fresh listing. Order is not
//!   guaranteed.
//!
//! ## Backends
//!
//! - [`KubeStore`]: a Kubernetes API server via `kube`.
//! - [`memory::MemoryCluster`]: an in-process cluster with the same
//!   semantics, a simulated signer and fault injection, used by tests and
//!   dry runs.

mod error;
mod kubernetes;
pub mod memory;

use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use permit_types::{Binding, BindingKey, ClusterInfo, CsrObject, Role, RoleKey};

pub use error::{ConnectError, StoreError, StoreResult};
pub use kubernetes::{KubeSettings, KubeStore};

/// Lazy listing of objects. Each item is fetched page by page.
pub type ObjectStream<T> = BoxStream<'static, StoreResult<T>>;

/// Outcome of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object did not exist and was created.
    Created,
    /// An equivalent object already existed; nothing was written.
    AlreadyExists,
}

impl CreateOutcome {
    pub fn created(&self) -> bool {
        matches!(self, CreateOutcome::Created)
    }
}

/// Which namespaced or cluster-scoped objects a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Cluster-scoped objects only (ClusterRoles, ClusterRoleBindings).
    Cluster,
    /// Namespaced objects in one namespace.
    Namespace(String),
    /// Namespaced objects across every namespace.
    AllNamespaces,
}

/// CRUD over Role, ClusterRole, RoleBinding and ClusterRoleBinding.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn create_role(&self, role: &Role) -> StoreResult<CreateOutcome>;

    async fn get_role(&self, key: &RoleKey) -> StoreResult<Role>;

    fn list_roles(&self, scope: ListScope) -> ObjectStream<Role>;

    async fn delete_role(&self, key: &RoleKey) -> StoreResult<()>;

    async fn create_binding(&self, binding: &Binding) -> StoreResult<CreateOutcome>;

    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Binding>;

    fn list_bindings(&self, scope: ListScope) -> ObjectStream<Binding>;

    /// Overwrites an existing binding's subjects.
    ///
    /// `binding.resource_version` must be the version that was read; a stale
    /// version fails with [`StoreError::Conflict`]. The role reference of a
    /// binding is immutable and must not change.
    async fn replace_binding(&self, binding: &Binding) -> StoreResult<Binding>;

    async fn delete_binding(&self, key: &BindingKey) -> StoreResult<()>;

    fn list_namespaces(&self) -> ObjectStream<String>;
}

/// The certificate-signing half of the orchestration API.
#[async_trait]
pub trait CertificateApi: Send + Sync {
    /// Submits a CSR. Idempotent on an identical request body.
    async fn create_csr(&self, csr: &CsrObject) -> StoreResult<CreateOutcome>;

    async fn get_csr(&self, name: &str) -> StoreResult<CsrObject>;

    /// Records an `Approved` condition. Approving an approved CSR is a no-op.
    async fn approve_csr(&self, name: &str, reason: &str, message: &str) -> StoreResult<()>;

    async fn delete_csr(&self, name: &str) -> StoreResult<()>;

    /// Public endpoint and CA of the cluster.
    async fn cluster_info(&self) -> StoreResult<ClusterInfo>;
}

/// Drains a listing into a vector.
pub async fn collect<T: Send>(stream: ObjectStream<T>) -> StoreResult<Vec<T>> {
    stream.try_collect().await
}
