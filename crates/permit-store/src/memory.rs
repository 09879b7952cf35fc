//! In-process orchestration API.
//!
//! [`MemoryCluster`] implements [`RbacStore`] and [`CertificateApi`] with the
//! same idempotence, conflict and pagination rules as the Kubernetes backend.
//! It also plays the parts of the external approver and signer: approved
//! CSRs are signed by an in-process CA, and the approver's behaviour is
//! configurable through [`SignerBehavior`].
//!
//! Faults are injected per [`Operation`]: [`MemoryCluster::fail_next`] makes
//! the next N calls of that operation fail with [`StoreError::Transient`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use futures::stream;
use futures::{StreamExt, TryStreamExt};
use permit_types::{
    Binding, BindingKey, ClusterInfo, CsrCondition, CsrConditionKind, CsrObject, CsrState,
    ObjectKind, ObjectRef, Role, RoleKey, Scope,
};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams, DnType,
    IsCa, KeyPair, KeyUsagePurpose,
};

use crate::{
    CertificateApi, CreateOutcome, ListScope, ObjectStream, RbacStore, StoreError, StoreResult,
};

/// Namespaces every fresh cluster starts with.
pub const DEFAULT_NAMESPACES: [&str; 3] = ["default", "kube-public", "kube-system"];

/// Endpoint reported by [`MemoryCluster::cluster_info`].
pub const MEMORY_ENDPOINT: &str = "https://permit.memory.invalid:6443";

const DEFAULT_PAGE_SIZE: usize = 2;

/// Operations that can have faults injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateRole,
    GetRole,
    ListRoles,
    DeleteRole,
    CreateBinding,
    GetBinding,
    ListBindings,
    ReplaceBinding,
    DeleteBinding,
    ListNamespaces,
    CreateCsr,
    GetCsr,
    ApproveCsr,
    DeleteCsr,
    ClusterInfo,
}

/// How the simulated external approver treats submitted CSRs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerBehavior {
    /// Nobody approves; only [`CertificateApi::approve_csr`] does.
    Manual,
    /// An external approver approves after the CSR has been read
    /// `after_reads` times.
    AutoApprove { after_reads: u32 },
    /// An external approver denies every CSR on first read.
    Deny { reason: String },
    /// The signer fails every approved CSR.
    Fail { reason: String },
}

#[derive(Debug)]
struct CsrEntry {
    csr: CsrObject,
    reads: u32,
    reads_since_approval: u32,
}

#[derive(Debug)]
struct State {
    roles: BTreeMap<RoleKey, Role>,
    bindings: BTreeMap<BindingKey, Binding>,
    namespaces: BTreeSet<String>,
    csrs: BTreeMap<String, CsrEntry>,
    signer: SignerBehavior,
    certificate_delay_reads: u32,
    faults: HashMap<Operation, u32>,
    next_version: u64,
    csr_submissions: u64,
}

impl State {
    fn check_fault(&mut self, op: Operation, object: impl FnOnce() -> ObjectRef) -> StoreResult<()> {
        match self.faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::transient(
                    object(),
                    format!("injected fault on {op:?}"),
                ))
            }
            _ => Ok(()),
        }
    }

    fn require_namespace(&self, scope: &Scope) -> StoreResult<()> {
        match scope {
            Scope::Namespace(ns) if !self.namespaces.contains(ns) => Err(StoreError::not_found(
                ObjectRef::cluster(ObjectKind::Namespace, ns.clone()),
            )),
            _ => Ok(()),
        }
    }

    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

struct SigningAuthority {
    cert: Certificate,
    key: KeyPair,
}

impl SigningAuthority {
    fn generate() -> Result<Self, rcgen::Error> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params
            .distinguished_name
            .push(DnType::CommonName, "permit-memory-ca");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let cert = params.self_signed(&key)?;
        Ok(Self { cert, key })
    }

    fn sign(&self, request_pem: &str) -> Result<String, rcgen::Error> {
        let request = CertificateSigningRequestParams::from_pem(request_pem)?;
        let issued = request.signed_by(&self.cert, &self.key)?;
        Ok(issued.pem())
    }
}

/// In-memory cluster. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryCluster {
    name: String,
    state: Arc<Mutex<State>>,
    authority: Arc<OnceLock<Result<SigningAuthority, String>>>,
    page_size: usize,
}

impl MemoryCluster {
    /// Creates an empty cluster with the default namespaces and a manual
    /// approver.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(State {
                roles: BTreeMap::new(),
                bindings: BTreeMap::new(),
                namespaces: DEFAULT_NAMESPACES.iter().map(|ns| ns.to_string()).collect(),
                csrs: BTreeMap::new(),
                signer: SignerBehavior::Manual,
                certificate_delay_reads: 0,
                faults: HashMap::new(),
                next_version: 0,
                csr_submissions: 0,
            })),
            authority: Arc::new(OnceLock::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets how many objects each listing page returns.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_signer(self, signer: SignerBehavior) -> Self {
        self.set_signer(signer);
        self
    }

    pub fn with_namespaces<I, S>(self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for ns in namespaces {
            self.add_namespace(ns);
        }
        self
    }

    pub fn set_signer(&self, signer: SignerBehavior) {
        self.lock().signer = signer;
    }

    /// Number of CSR reads between approval and the certificate appearing.
    pub fn set_certificate_delay(&self, reads: u32) {
        self.lock().certificate_delay_reads = reads;
    }

    pub fn add_namespace(&self, namespace: impl Into<String>) {
        self.lock().namespaces.insert(namespace.into());
    }

    /// Makes the next `times` calls of `op` fail with a transient error.
    pub fn fail_next(&self, op: Operation, times: u32) {
        *self.lock().faults.entry(op).or_insert(0) += times;
    }

    /// Denies a pending CSR, as an external approver would.
    pub fn deny_csr(&self, name: &str, reason: &str) -> StoreResult<()> {
        let mut state = self.lock();
        let entry = state
            .csrs
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(ObjectRef::csr(name)))?;
        entry.csr.status.conditions.push(CsrCondition::new(
            CsrConditionKind::Denied,
            reason,
            "denied by external approver",
        ));
        Ok(())
    }

    /// Current CSR objects.
    pub fn csrs(&self) -> Vec<CsrObject> {
        self.lock().csrs.values().map(|e| e.csr.clone()).collect()
    }

    /// How many CSR creates actually wrote a new object.
    pub fn csr_submissions(&self) -> u64 {
        self.lock().csr_submissions
    }

    /// Every stored binding, sorted by key.
    pub fn bindings(&self) -> Vec<Binding> {
        self.lock().bindings.values().cloned().collect()
    }

    /// Every stored role, sorted by key.
    pub fn roles(&self) -> Vec<Role> {
        self.lock().roles.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep
        // serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn authority(&self) -> Result<&SigningAuthority, String> {
        self.authority
            .get_or_init(|| SigningAuthority::generate().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Moves a CSR along: external approval decisions, then signing.
    fn advance(&self, entry: &mut CsrEntry, signer: &SignerBehavior, delay: u32) {
        if entry.csr.state() == CsrState::Pending {
            match signer {
                SignerBehavior::Manual => {}
                SignerBehavior::AutoApprove { after_reads } => {
                    if entry.reads >= *after_reads {
                        entry.csr.status.conditions.push(CsrCondition::new(
                            CsrConditionKind::Approved,
                            "AutoApproved",
                            "approved by external approver",
                        ));
                    }
                }
                SignerBehavior::Deny { reason } => {
                    entry.csr.status.conditions.push(CsrCondition::new(
                        CsrConditionKind::Denied,
                        reason.clone(),
                        "denied by external approver",
                    ));
                }
                SignerBehavior::Fail { .. } => {}
            }
        }

        if entry.csr.state() != CsrState::Approved {
            return;
        }
        if entry.reads_since_approval < delay {
            entry.reads_since_approval += 1;
            return;
        }

        if let SignerBehavior::Fail { reason } = signer {
            entry.csr.status.conditions.push(CsrCondition::new(
                CsrConditionKind::Failed,
                reason.clone(),
                "signer failed",
            ));
            return;
        }

        let signed = self
            .authority()
            .and_then(|ca| ca.sign(&entry.csr.request_pem).map_err(|e| e.to_string()));
        match signed {
            Ok(pem) => entry.csr.status.certificate_pem = Some(pem),
            Err(e) => entry.csr.status.conditions.push(CsrCondition::new(
                CsrConditionKind::Failed,
                "SignerError",
                e,
            )),
        }
    }

    /// Paginated listing. Each page re-reads the state and resumes after the
    /// last key returned, the way a `continue` token does.
    fn paged<K, T, F>(&self, op: Operation, object: ObjectRef, select: F) -> ObjectStream<T>
    where
        K: Ord + Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(&State, Option<&K>, usize) -> Vec<(K, T)> + Send + Sync + 'static,
    {
        let cluster = self.clone();
        let page_size = self.page_size;
        let select = Arc::new(select);

        stream::try_unfold(Some(None::<K>), move |cursor| {
            let cluster = cluster.clone();
            let object = object.clone();
            let select = Arc::clone(&select);
            async move {
                let Some(after) = cursor else {
                    return Ok(None);
                };
                let mut state = cluster.lock();
                state.check_fault(op, || object.clone())?;
                let page = select(&state, after.as_ref(), page_size);
                drop(state);

                let next = if page.len() < page_size {
                    None
                } else {
                    page.last().map(|(k, _)| Some(k.clone()))
                };
                let items: Vec<T> = page.into_iter().map(|(_, v)| v).collect();
                Ok::<_, StoreError>(Some((items, next)))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<T, StoreError>)))
        .try_flatten()
        .boxed()
    }
}

fn in_scope(scope: &Scope, list: &ListScope) -> bool {
    match (list, scope) {
        (ListScope::Cluster, Scope::Cluster) => true,
        (ListScope::Namespace(wanted), Scope::Namespace(ns)) => wanted == ns,
        (ListScope::AllNamespaces, Scope::Namespace(_)) => true,
        _ => false,
    }
}

fn page_of<K: Ord + Clone, V: Clone>(
    map: &BTreeMap<K, V>,
    after: Option<&K>,
    page_size: usize,
    keep: impl Fn(&V) -> bool,
) -> Vec<(K, V)> {
    map.iter()
        .filter(|(k, _)| after.is_none_or(|a| *k > a))
        .filter(|(_, v)| keep(v))
        .take(page_size)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn list_kind(scope: &ListScope, cluster: ObjectKind, namespaced: ObjectKind) -> ObjectRef {
    match scope {
        ListScope::Cluster => ObjectRef::listing(cluster, None),
        ListScope::Namespace(ns) => ObjectRef::listing(namespaced, Some(ns.as_str())),
        ListScope::AllNamespaces => ObjectRef::listing(namespaced, None),
    }
}

#[async_trait]
impl RbacStore for MemoryCluster {
    async fn create_role(&self, role: &Role) -> StoreResult<CreateOutcome> {
        let key = role.key();
        let object = ObjectRef::role(&key);
        let mut state = self.lock();
        state.check_fault(Operation::CreateRole, || object.clone())?;
        state.require_namespace(&role.scope)?;

        match state.roles.get(&key) {
            Some(existing) if existing.same_definition(role) => Ok(CreateOutcome::AlreadyExists),
            Some(_) => Err(StoreError::conflict(
                object,
                "exists with different rules",
            )),
            None => {
                state.roles.insert(key, role.clone());
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn get_role(&self, key: &RoleKey) -> StoreResult<Role> {
        let object = ObjectRef::role(key);
        let mut state = self.lock();
        state.check_fault(Operation::GetRole, || object.clone())?;
        state
            .roles
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(object))
    }

    fn list_roles(&self, scope: ListScope) -> ObjectStream<Role> {
        let object = list_kind(&scope, ObjectKind::ClusterRole, ObjectKind::Role);
        self.paged(Operation::ListRoles, object, move |state, after, size| {
            page_of(&state.roles, after, size, |r: &Role| in_scope(&r.scope, &scope))
        })
    }

    async fn delete_role(&self, key: &RoleKey) -> StoreResult<()> {
        let object = ObjectRef::role(key);
        let mut state = self.lock();
        state.check_fault(Operation::DeleteRole, || object)?;
        state.roles.remove(key);
        Ok(())
    }

    async fn create_binding(&self, binding: &Binding) -> StoreResult<CreateOutcome> {
        let key = binding.key();
        let object = ObjectRef::binding(&key);
        let mut state = self.lock();
        state.check_fault(Operation::CreateBinding, || object.clone())?;
        state.require_namespace(&binding.scope)?;
        if binding.target_role().is_none() {
            return Err(StoreError::invalid(
                object,
                "a ClusterRoleBinding may only reference a ClusterRole",
            ));
        }

        match state.bindings.get(&key) {
            Some(existing) if existing.same_definition(binding) => {
                Ok(CreateOutcome::AlreadyExists)
            }
            Some(_) => Err(StoreError::conflict(
                object,
                "exists with a different role or subjects",
            )),
            None => {
                let mut stored = binding.clone();
                stored.resource_version = Some(state.bump_version());
                state.bindings.insert(key, stored);
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Binding> {
        let object = ObjectRef::binding(key);
        let mut state = self.lock();
        state.check_fault(Operation::GetBinding, || object.clone())?;
        state
            .bindings
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(object))
    }

    fn list_bindings(&self, scope: ListScope) -> ObjectStream<Binding> {
        let object = list_kind(&scope, ObjectKind::ClusterRoleBinding, ObjectKind::RoleBinding);
        self.paged(Operation::ListBindings, object, move |state, after, size| {
            page_of(&state.bindings, after, size, |b: &Binding| {
                in_scope(&b.scope, &scope)
            })
        })
    }

    async fn replace_binding(&self, binding: &Binding) -> StoreResult<Binding> {
        let key = binding.key();
        let object = ObjectRef::binding(&key);
        let mut state = self.lock();
        state.check_fault(Operation::ReplaceBinding, || object.clone())?;

        let current = state
            .bindings
            .get(&key)
            .ok_or_else(|| StoreError::not_found(object.clone()))?;
        if current.resource_version != binding.resource_version {
            return Err(StoreError::conflict(
                object,
                "the object has been modified; re-read and retry",
            ));
        }
        if current.role_ref != binding.role_ref {
            return Err(StoreError::invalid(object, "roleRef is immutable"));
        }

        let mut stored = binding.clone();
        stored.resource_version = Some(state.bump_version());
        state.bindings.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_binding(&self, key: &BindingKey) -> StoreResult<()> {
        let object = ObjectRef::binding(key);
        let mut state = self.lock();
        state.check_fault(Operation::DeleteBinding, || object)?;
        state.bindings.remove(key);
        Ok(())
    }

    fn list_namespaces(&self) -> ObjectStream<String> {
        let object = ObjectRef::listing(ObjectKind::Namespace, None);
        self.paged(
            Operation::ListNamespaces,
            object,
            |state, after: Option<&String>, size| {
                state
                    .namespaces
                    .iter()
                    .filter(|ns| after.is_none_or(|a| *ns > a))
                    .take(size)
                    .map(|ns| (ns.clone(), ns.clone()))
                    .collect()
            },
        )
    }
}

#[async_trait]
impl CertificateApi for MemoryCluster {
    async fn create_csr(&self, csr: &CsrObject) -> StoreResult<CreateOutcome> {
        let object = ObjectRef::csr(csr.name.clone());
        let mut state = self.lock();
        state.check_fault(Operation::CreateCsr, || object.clone())?;

        match state.csrs.get(&csr.name) {
            Some(existing) if existing.csr.same_definition(csr) => {
                Ok(CreateOutcome::AlreadyExists)
            }
            Some(_) => Err(StoreError::conflict(
                object,
                "exists with a different request",
            )),
            None => {
                let mut stored = csr.clone();
                stored.status = Default::default();
                state.csrs.insert(
                    csr.name.clone(),
                    CsrEntry {
                        csr: stored,
                        reads: 0,
                        reads_since_approval: 0,
                    },
                );
                state.csr_submissions += 1;
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn get_csr(&self, name: &str) -> StoreResult<CsrObject> {
        let object = ObjectRef::csr(name);
        let mut guard = self.lock();
        let state = &mut *guard;
        state.check_fault(Operation::GetCsr, || object.clone())?;

        let signer = state.signer.clone();
        let delay = state.certificate_delay_reads;
        let entry = state
            .csrs
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(object))?;
        entry.reads += 1;
        self.advance(entry, &signer, delay);
        Ok(entry.csr.clone())
    }

    async fn approve_csr(&self, name: &str, reason: &str, message: &str) -> StoreResult<()> {
        let object = ObjectRef::csr(name);
        let mut guard = self.lock();
        let state = &mut *guard;
        state.check_fault(Operation::ApproveCsr, || object.clone())?;

        let entry = state
            .csrs
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(object))?;
        let approved = entry
            .csr
            .status
            .conditions
            .iter()
            .any(|c| c.kind == CsrConditionKind::Approved);
        if !approved {
            entry.csr.status.conditions.push(CsrCondition::new(
                CsrConditionKind::Approved,
                reason,
                message,
            ));
        }
        Ok(())
    }

    async fn delete_csr(&self, name: &str) -> StoreResult<()> {
        let object = ObjectRef::csr(name);
        let mut state = self.lock();
        state.check_fault(Operation::DeleteCsr, || object)?;
        state.csrs.remove(name);
        Ok(())
    }

    async fn cluster_info(&self) -> StoreResult<ClusterInfo> {
        let object = ObjectRef::cluster(ObjectKind::ConfigMap, "kube-root-ca.crt");
        self.lock()
            .check_fault(Operation::ClusterInfo, || object.clone())?;
        let ca = self.authority().map_err(|message| StoreError::Api {
            object,
            code: 500,
            message,
        })?;
        Ok(ClusterInfo::new(
            self.name.clone(),
            MEMORY_ENDPOINT,
            ca.cert.pem(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect;
    use permit_types::{PolicyRule, RoleRef, Subject};

    fn viewer(rules: Vec<PolicyRule>) -> Role {
        Role::new("viewer", Scope::Cluster, rules)
    }

    fn read_pods() -> Vec<PolicyRule> {
        vec![PolicyRule::new([""], ["pods"], ["get", "list"])]
    }

    fn request_pem(cn: &str) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    #[tokio::test]
    async fn create_role_is_idempotent_and_detects_conflicts() {
        let cluster = MemoryCluster::new("test");

        assert_eq!(
            cluster.create_role(&viewer(read_pods())).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            cluster.create_role(&viewer(read_pods())).await.unwrap(),
            CreateOutcome::AlreadyExists
        );

        let other = viewer(vec![PolicyRule::new([""], ["secrets"], ["*"])]);
        let err = cluster.create_role(&other).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.roles()[0].rules, read_pods());
    }

    #[tokio::test]
    async fn namespaced_objects_require_the_namespace() {
        let cluster = MemoryCluster::new("test");
        let role = Role::new("deployer", Scope::namespace("missing"), read_pods());

        let err = cluster.create_role(&role).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.object().kind, ObjectKind::Namespace);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cluster = MemoryCluster::new("test");
        let key = RoleKey::new(Scope::Cluster, "never-existed");

        cluster.delete_role(&key).await.unwrap();
        cluster
            .delete_binding(&BindingKey::new(Scope::Cluster, "nope"))
            .await
            .unwrap();
        cluster.delete_csr("nope").await.unwrap();
    }

    #[tokio::test]
    async fn listings_paginate_and_filter_by_scope() {
        let cluster = MemoryCluster::new("test")
            .with_page_size(2)
            .with_namespaces(["dev", "prod"]);

        for i in 0..5 {
            cluster
                .create_role(&Role::new(format!("c{i}"), Scope::Cluster, read_pods()))
                .await
                .unwrap();
        }
        cluster
            .create_role(&Role::new("d", Scope::namespace("dev"), read_pods()))
            .await
            .unwrap();
        cluster
            .create_role(&Role::new("p", Scope::namespace("prod"), read_pods()))
            .await
            .unwrap();

        let cluster_roles = collect(cluster.list_roles(ListScope::Cluster)).await.unwrap();
        assert_eq!(cluster_roles.len(), 5);

        let dev = collect(cluster.list_roles(ListScope::Namespace("dev".into())))
            .await
            .unwrap();
        assert_eq!(dev.len(), 1);

        let all = collect(cluster.list_roles(ListScope::AllNamespaces))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let namespaces = collect(cluster.list_namespaces()).await.unwrap();
        assert_eq!(namespaces.len(), DEFAULT_NAMESPACES.len() + 2);
    }

    #[tokio::test]
    async fn listing_surfaces_injected_faults_and_restarts_cleanly() {
        let cluster = MemoryCluster::new("test").with_page_size(1);
        for i in 0..3 {
            cluster
                .create_role(&Role::new(format!("r{i}"), Scope::Cluster, read_pods()))
                .await
                .unwrap();
        }

        cluster.fail_next(Operation::ListRoles, 1);
        let err = collect(cluster.list_roles(ListScope::Cluster))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let roles = collect(cluster.list_roles(ListScope::Cluster)).await.unwrap();
        assert_eq!(roles.len(), 3);
    }

    #[tokio::test]
    async fn replace_binding_enforces_resource_version() {
        let cluster = MemoryCluster::new("test");
        let binding = Binding::new(
            "shared",
            Scope::Cluster,
            RoleRef::cluster_role("viewer"),
            vec![Subject::user("alice"), Subject::user("bob")],
        );
        cluster.create_binding(&binding).await.unwrap();

        let stored = cluster.get_binding(&binding.key()).await.unwrap();
        let updated = cluster
            .replace_binding(&stored.without_user("alice"))
            .await
            .unwrap();
        assert_eq!(updated.subjects, vec![Subject::user("bob")]);

        let stale = stored.without_user("bob");
        assert!(cluster.replace_binding(&stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn cluster_binding_cannot_reference_a_role() {
        let cluster = MemoryCluster::new("test");
        let binding = Binding::new(
            "bad",
            Scope::Cluster,
            RoleRef::role("deployer"),
            vec![Subject::user("alice")],
        );
        let err = cluster.create_binding(&binding).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }

    #[tokio::test]
    async fn approved_csr_is_signed_after_configured_delay() {
        let cluster = MemoryCluster::new("test");
        cluster.set_certificate_delay(1);

        let csr = CsrObject::client_auth(
            "permit-user___alice",
            request_pem("alice"),
            permit_types::KUBE_APISERVER_CLIENT_SIGNER,
        );
        cluster.create_csr(&csr).await.unwrap();
        assert_eq!(cluster.get_csr(&csr.name).await.unwrap().state(), CsrState::Pending);

        cluster.approve_csr(&csr.name, "Test", "ok").await.unwrap();
        assert_eq!(cluster.get_csr(&csr.name).await.unwrap().state(), CsrState::Approved);

        let issued = cluster.get_csr(&csr.name).await.unwrap();
        match issued.state() {
            CsrState::Issued { certificate_pem } => {
                assert!(certificate_pem.starts_with("-----BEGIN CERTIFICATE-----"));
            }
            other => panic!("expected issued, got {other}"),
        }
    }

    #[tokio::test]
    async fn auto_approver_and_denier() {
        let cluster = MemoryCluster::new("test").with_signer(SignerBehavior::AutoApprove {
            after_reads: 2,
        });
        let csr = CsrObject::client_auth("a", request_pem("a"), "signer");
        cluster.create_csr(&csr).await.unwrap();

        assert_eq!(cluster.get_csr("a").await.unwrap().state(), CsrState::Pending);
        assert!(matches!(
            cluster.get_csr("a").await.unwrap().state(),
            CsrState::Issued { .. }
        ));

        cluster.set_signer(SignerBehavior::Deny {
            reason: "NoThanks".into(),
        });
        let denied = CsrObject::client_auth("b", request_pem("b"), "signer");
        cluster.create_csr(&denied).await.unwrap();
        assert!(matches!(
            cluster.get_csr("b").await.unwrap().state(),
            CsrState::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn csr_create_is_idempotent_on_identical_request() {
        let cluster = MemoryCluster::new("test");
        let csr = CsrObject::client_auth("a", request_pem("a"), "signer");

        assert!(cluster.create_csr(&csr).await.unwrap().created());
        assert!(!cluster.create_csr(&csr).await.unwrap().created());
        assert_eq!(cluster.csr_submissions(), 1);

        let different = CsrObject::client_auth("a", request_pem("a"), "signer");
        assert!(cluster.create_csr(&different).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn cluster_info_reports_memory_ca() {
        let cluster = MemoryCluster::new("test");
        let info = cluster.cluster_info().await.unwrap();

        assert_eq!(info.name, "test");
        assert_eq!(info.endpoint, MEMORY_ENDPOINT);
        assert!(info.ca_pem.contains("BEGIN CERTIFICATE"));
    }
}
