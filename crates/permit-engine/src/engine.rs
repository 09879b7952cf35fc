//! User-centric operations over the store and the issuer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use permit_graph::{AccessQuery, BindingEntry, PermissionGraph};
use permit_issuer::{CredentialIssuer, IssuerConfig, kubeconfig};
use permit_store::{CertificateApi, CreateOutcome, ListScope, RbacStore, collect};
use permit_types::{
    Binding, BindingKey, CredentialBundle, LABEL_MANAGED_BY, MANAGED_BY, ObjectRef, PolicyRule,
    Role, RoleKey, RoleRef, Scope, Subject, UserName, binding_name, csr_name,
    fallback_binding_name, managed_labels, validate_object_name,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};
use crate::templates::{AccessPlan, NamespaceSelection, StandardTemplates};

/// Approval wait used when the caller does not pass one.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "binding", rename_all = "snake_case")]
pub enum GrantOutcome {
    Granted(BindingKey),
    /// A binding in the scope already granted the role to the user.
    AlreadyGranted(BindingKey),
}

impl GrantOutcome {
    pub fn binding(&self) -> &BindingKey {
        match self {
            GrantOutcome::Granted(key) | GrantOutcome::AlreadyGranted(key) => key,
        }
    }
}

/// Bindings changed while removing a user from them.
///
/// Both lists are empty when there was nothing to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Removal {
    /// Bindings that named only the user and were deleted.
    pub deleted: Vec<BindingKey>,
    /// Shared bindings the user was taken out of.
    pub trimmed: Vec<BindingKey>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.trimmed.is_empty()
    }

    fn record(&mut self, key: BindingKey, deleted: bool) {
        if deleted {
            self.deleted.push(key);
        } else {
            self.trimmed.push(key);
        }
    }
}

/// One user as seen through the bindings that name them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub name: String,
    pub bindings: usize,
    /// Bindings whose role no longer exists.
    pub dangling: usize,
}

/// Which roles a listing returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoleFilter {
    /// ClusterRoles and the Roles of every namespace.
    #[default]
    All,
    Cluster,
    Namespace(String),
}

/// A newly provisioned user: the credentials plus every grant applied.
#[derive(Debug)]
pub struct Provisioned {
    pub bundle: CredentialBundle,
    pub grants: Vec<GrantOutcome>,
}

/// The orchestration engine.
///
/// Holds no state of its own besides the issuer's cached cluster info.
/// Every operation reads what it needs from the store and relies on
/// deterministic names and idempotent creates and deletes, so retrying any
/// operation after a partial failure converges.
pub struct Engine {
    store: Arc<dyn RbacStore>,
    certificates: Arc<dyn CertificateApi>,
    issuer: CredentialIssuer,
    approval_timeout: Duration,
}

impl Engine {
    pub fn new(
        store: Arc<dyn RbacStore>,
        certificates: Arc<dyn CertificateApi>,
        issuer: IssuerConfig,
    ) -> Self {
        Self {
            store,
            issuer: CredentialIssuer::new(Arc::clone(&certificates), issuer),
            certificates,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }

    /// Builds an engine over a backend that serves both APIs.
    pub fn for_cluster<C>(cluster: C, issuer: IssuerConfig) -> Self
    where
        C: RbacStore + CertificateApi + 'static,
    {
        let cluster = Arc::new(cluster);
        Self::new(cluster.clone(), cluster, issuer)
    }

    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn approval_timeout(&self) -> Duration {
        self.approval_timeout
    }

    pub fn store(&self) -> &dyn RbacStore {
        self.store.as_ref()
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Issues credentials for a new user. Grants nothing.
    pub async fn create_user(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CredentialBundle> {
        self.create_user_within(name, self.approval_timeout, cancel)
            .await
    }

    /// Like [`Engine::create_user`] with an explicit approval timeout.
    #[instrument(skip(self, name, cancel), fields(user = %name))]
    pub async fn create_user_within(
        &self,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CredentialBundle> {
        let user = UserName::new(name)?;
        let bundle = self.issuer.issue(&user, timeout, cancel).await?;
        info!(cluster = %bundle.cluster.name, "created user");
        Ok(bundle)
    }

    /// Removes every binding naming the user and the user's pending CSR.
    ///
    /// A certificate issued earlier is not revoked: it still authenticates
    /// but no longer authorizes anything once the bindings are gone.
    #[instrument(skip(self, name), fields(user = %name))]
    pub async fn delete_user(&self, name: &str) -> Result<Removal> {
        let user = UserName::new(name)?;
        let graph = PermissionGraph::load(self.store.as_ref()).await?;

        let mut removal = Removal::default();
        for entry in graph.bindings_for(user.as_str()) {
            let deleted = self.remove_subject(&entry.binding, &user).await?;
            removal.record(entry.binding.key(), deleted);
        }

        self.certificates.delete_csr(&csr_name(&user)).await?;
        info!(
            deleted = removal.deleted.len(),
            trimmed = removal.trimmed.len(),
            "deleted user"
        );
        Ok(removal)
    }

    /// Every user named by a binding, sorted.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let graph = PermissionGraph::load(self.store.as_ref()).await?;
        Ok(graph
            .users()
            .map(|user| UserSummary {
                name: user.to_string(),
                bindings: graph.bindings_for(user).len(),
                dangling: graph.dangling_for(user).len(),
            })
            .collect())
    }

    /// Creates a user and applies an access plan.
    ///
    /// The templates the plan refers to are checked before any credential is
    /// issued. Grants run after issuance; a failure part way leaves the
    /// grants made so far, and repeating the call completes the rest.
    #[instrument(skip(self, name, plan, cancel), fields(user = %name, template = %plan.template))]
    pub async fn provision_user(
        &self,
        name: &str,
        plan: &AccessPlan,
        cancel: &CancellationToken,
    ) -> Result<Provisioned> {
        let user = UserName::new(name)?;

        let mut targets: Vec<(RoleRef, Scope)> = Vec::new();
        let namespaces = match &plan.namespaces {
            NamespaceSelection::All => self.list_namespaces().await?,
            NamespaceSelection::Only(namespaces) => namespaces.clone(),
        };
        targets.extend(
            namespaces
                .into_iter()
                .map(|ns| (plan.template.role_ref(), Scope::namespace(ns))),
        );
        if let Some(template) = plan.cluster_access.template() {
            targets.push((template.role_ref(), Scope::Cluster));
        }

        for role in targets.iter().map(|(role, _)| role) {
            self.require_role(role, &Scope::Cluster).await?;
        }

        let bundle = self.create_user(user.as_str(), cancel).await?;
        let grants = try_join_all(
            targets
                .iter()
                .map(|(role, scope)| self.grant_role(user.as_str(), role, scope)),
        )
        .await?;

        info!(grants = grants.len(), "provisioned user");
        Ok(Provisioned { bundle, grants })
    }

    /// Renders a bundle as a kubeconfig document.
    pub fn kubeconfig_for(
        &self,
        bundle: &CredentialBundle,
        namespace: Option<&str>,
    ) -> Result<Zeroizing<String>> {
        Ok(kubeconfig::render(bundle, namespace)?)
    }

    // ------------------------------------------------------------------
    // Grants
    // ------------------------------------------------------------------

    /// Binds `role` to the user in `scope`.
    ///
    /// The role must exist. If any binding in the scope already grants the
    /// role to the user, nothing is written.
    ///
    /// The binding is created under [`binding_name`]. If that name holds a
    /// binding for the same role (one the user was trimmed out of), the user
    /// is added back to it. If it holds a binding for a different role, the
    /// grant moves to [`fallback_binding_name`] and the same rules apply
    /// there.
    #[instrument(skip(self), fields(user = %user, role = %role, scope = %scope))]
    pub async fn grant_role(&self, user: &str, role: &RoleRef, scope: &Scope) -> Result<GrantOutcome> {
        let user = UserName::new(user)?;
        self.require_role(role, scope).await?;

        let existing = collect(self.store.list_bindings(list_scope(scope))).await?;
        if let Some(binding) = existing.iter().find(|b| b.grants(&user, role)) {
            debug!(binding = %binding.key(), "role already granted");
            return Ok(GrantOutcome::AlreadyGranted(binding.key()));
        }

        let primary = binding_name(&user, role, scope);
        match self.bind_as(&user, role, scope, primary).await? {
            Some(outcome) => Ok(outcome),
            None => {
                let fallback = fallback_binding_name(&user, role, scope);
                debug!(binding = %fallback, "name taken by another role, using fallback");
                match self.bind_as(&user, role, scope, fallback.clone()).await? {
                    Some(outcome) => Ok(outcome),
                    None => Err(EngineError::Conflict {
                        object: ObjectRef::binding(&BindingKey::new(scope.clone(), fallback)),
                        detail: "name is held by a binding for a different role".to_string(),
                    }),
                }
            }
        }
    }

    /// Takes `role` in `scope` away from the user. Revoking a role that was
    /// never granted succeeds with an empty [`Removal`].
    #[instrument(skip(self), fields(user = %user, role = %role, scope = %scope))]
    pub async fn revoke_role(&self, user: &str, role: &RoleRef, scope: &Scope) -> Result<Removal> {
        let user = UserName::new(user)?;
        role.target(scope)?;

        let existing = collect(self.store.list_bindings(list_scope(scope))).await?;
        let mut removal = Removal::default();
        for binding in existing.iter().filter(|b| b.grants(&user, role)) {
            let deleted = self.remove_subject(binding, &user).await?;
            removal.record(binding.key(), deleted);
        }

        if removal.is_empty() {
            debug!("role was not granted");
        } else {
            info!(
                deleted = removal.deleted.len(),
                trimmed = removal.trimmed.len(),
                "revoked role"
            );
        }
        Ok(removal)
    }

    /// Every binding, or only those naming `user`, with dangling role
    /// references flagged.
    #[instrument(skip(self))]
    pub async fn list_bindings(&self, user: Option<&str>) -> Result<Vec<BindingEntry>> {
        let graph = PermissionGraph::load(self.store.as_ref()).await?;
        Ok(match user {
            Some(user) => graph.bindings_for(user).into_iter().cloned().collect(),
            None => graph.entries().to_vec(),
        })
    }

    /// Users allowed to perform `query`, sorted.
    #[instrument(skip(self))]
    pub async fn who_can(&self, query: &AccessQuery) -> Result<Vec<String>> {
        let graph = PermissionGraph::load(self.store.as_ref()).await?;
        Ok(graph
            .who_can(query)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Creates a Role (namespace scope) or ClusterRole (cluster scope).
    ///
    /// An equivalent existing role is success; one with different rules is
    /// [`EngineError::Conflict`] and stays as it was.
    #[instrument(skip(self, rules), fields(rules = rules.len()))]
    pub async fn create_role(
        &self,
        name: &str,
        scope: Scope,
        rules: Vec<PolicyRule>,
    ) -> Result<CreateOutcome> {
        validate_object_name(name)?;
        let role = Role::new(name, scope, rules)
            .with_labels([(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string())].into());

        let outcome = self.store.create_role(&role).await?;
        if outcome.created() {
            info!(role = %role.key(), "created role");
        }
        Ok(outcome)
    }

    /// Deletes a role. Bindings that refer to it are left dangling.
    #[instrument(skip(self), fields(role = %key))]
    pub async fn delete_role(&self, key: &RoleKey) -> Result<()> {
        self.store.delete_role(key).await?;
        info!("deleted role");
        Ok(())
    }

    /// Roles matching `filter`, sorted by scope then name.
    #[instrument(skip(self))]
    pub async fn list_roles(&self, filter: &RoleFilter) -> Result<Vec<Role>> {
        let mut roles = match filter {
            RoleFilter::All => {
                let (mut cluster, namespaced) = futures::try_join!(
                    collect(self.store.list_roles(ListScope::Cluster)),
                    collect(self.store.list_roles(ListScope::AllNamespaces)),
                )?;
                cluster.extend(namespaced);
                cluster
            }
            RoleFilter::Cluster => collect(self.store.list_roles(ListScope::Cluster)).await?,
            RoleFilter::Namespace(ns) => {
                collect(self.store.list_roles(ListScope::Namespace(ns.clone()))).await?
            }
        };
        roles.sort_by_key(Role::key);
        Ok(roles)
    }

    /// Creates the built-in access templates that do not exist yet.
    #[instrument(skip(self))]
    pub async fn install_templates(&self) -> Result<Vec<(RoleKey, CreateOutcome)>> {
        let mut installed = Vec::new();
        for role in StandardTemplates::all() {
            let outcome = self.store.create_role(&role).await?;
            if outcome.created() {
                info!(role = %role.key(), "installed template");
            }
            installed.push((role.key(), outcome));
        }
        Ok(installed)
    }

    /// Namespaces of the cluster, sorted.
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut namespaces = collect(self.store.list_namespaces()).await?;
        namespaces.sort();
        Ok(namespaces)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Fails with [`EngineError::RoleNotFound`] unless the role `role`
    /// resolves to from `scope` exists.
    async fn require_role(&self, role: &RoleRef, scope: &Scope) -> Result<()> {
        let target = role.target(scope)?;
        match self.store.get_role(&target).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(EngineError::RoleNotFound { role: target }),
            Err(e) => Err(e.into()),
        }
    }

    /// Grants `role` to `user` through the binding called `name`.
    ///
    /// Returns `None` when `name` is held by a binding for another role.
    async fn bind_as(
        &self,
        user: &UserName,
        role: &RoleRef,
        scope: &Scope,
        name: String,
    ) -> Result<Option<GrantOutcome>> {
        let binding = Binding::new(
            name,
            scope.clone(),
            role.clone(),
            vec![Subject::user(user.as_str())],
        )
        .with_labels(managed_labels(user));
        let key = binding.key();

        match self.store.create_binding(&binding).await {
            Ok(CreateOutcome::Created) => {
                info!(binding = %key, "granted role");
                return Ok(Some(GrantOutcome::Granted(key)));
            }
            Ok(CreateOutcome::AlreadyExists) => {
                return Ok(Some(GrantOutcome::AlreadyGranted(key)));
            }
            Err(e) if e.is_conflict() => {}
            Err(e) => return Err(e.into()),
        }

        let mut stored = self.store.get_binding(&key).await?;
        if stored.role_ref != *role {
            return Ok(None);
        }
        if stored.grants(user, role) {
            return Ok(Some(GrantOutcome::AlreadyGranted(key)));
        }

        stored.subjects.push(Subject::user(user.as_str()));
        self.store.replace_binding(&stored).await?;
        info!(binding = %key, "added user to existing binding");
        Ok(Some(GrantOutcome::Granted(key)))
    }

    /// Removes `user` from `binding`: deletes it when no subject would be
    /// left, otherwise writes it back without the user. Returns whether the
    /// binding was deleted.
    async fn remove_subject(&self, binding: &Binding, user: &UserName) -> Result<bool> {
        let remaining = binding.without_user(user.as_str());
        if remaining.subjects.is_empty() {
            self.store.delete_binding(&binding.key()).await?;
            debug!(binding = %binding.key(), "deleted binding");
            Ok(true)
        } else {
            self.store.replace_binding(&remaining).await?;
            debug!(
                binding = %binding.key(),
                remaining = remaining.subjects.len(),
                "removed user from shared binding"
            );
            Ok(false)
        }
    }
}

fn list_scope(scope: &Scope) -> ListScope {
    match scope {
        Scope::Cluster => ListScope::Cluster,
        Scope::Namespace(ns) => ListScope::Namespace(ns.clone()),
    }
}
