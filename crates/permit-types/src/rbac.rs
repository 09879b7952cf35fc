//! RBAC objects: roles, bindings and the subjects they name.
//!
//! Namespace-scoped and cluster-scoped variants share one shape and are told
//! apart by [`Scope`]: a `Role` is a [`Role`] with a namespace scope, a
//! `ClusterRole` one with [`Scope::Cluster`]. The same holds for
//! `RoleBinding` / `ClusterRoleBinding` and [`Binding`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::names::{NameError, UserName};

/// API group of the RBAC objects and of `User`/`Group` subjects.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Where an RBAC object lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Cluster-wide (`ClusterRole`, `ClusterRoleBinding`).
    Cluster,
    /// Inside one namespace (`Role`, `RoleBinding`).
    Namespace(String),
}

impl Scope {
    pub fn namespace(ns: impl Into<String>) -> Self {
        Scope::Namespace(ns.into())
    }

    /// Returns the namespace, or `None` for cluster scope.
    pub fn namespace_name(&self) -> Option<&str> {
        match self {
            Scope::Cluster => None,
            Scope::Namespace(ns) => Some(ns),
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, Scope::Cluster)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => f.write_str("cluster"),
            Scope::Namespace(ns) => write!(f, "namespace/{ns}"),
        }
    }
}

/// Kind of role a binding points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    Role,
    ClusterRole,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Role => "Role",
            RoleKind::ClusterRole => "ClusterRole",
        }
    }

    /// Parses the Kubernetes `kind` string.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Role" => Some(RoleKind::Role),
            "ClusterRole" => Some(RoleKind::ClusterRole),
            _ => None,
        }
    }
}

impl Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a stored Role or ClusterRole object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleKey {
    pub scope: Scope,
    pub name: String,
}

impl RoleKey {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> RoleKind {
        match self.scope {
            Scope::Cluster => RoleKind::ClusterRole,
            Scope::Namespace(_) => RoleKind::Role,
        }
    }
}

impl Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Cluster => write!(f, "ClusterRole {}", self.name),
            Scope::Namespace(ns) => write!(f, "Role {ns}/{}", self.name),
        }
    }
}

/// Immutable reference from a binding to the role it grants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    pub kind: RoleKind,
    pub name: String,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self {
            kind: RoleKind::Role,
            name: name.into(),
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            kind: RoleKind::ClusterRole,
            name: name.into(),
        }
    }

    /// Resolves which stored role a binding in `binding_scope` points at.
    ///
    /// A `Role` reference resolves inside the binding's namespace; a
    /// `ClusterRole` reference always resolves at cluster scope. A `Role`
    /// cannot be referenced from a cluster-scope binding.
    pub fn target(&self, binding_scope: &Scope) -> Result<RoleKey, NameError> {
        match (self.kind, binding_scope) {
            (RoleKind::ClusterRole, _) => Ok(RoleKey::new(Scope::Cluster, self.name.clone())),
            (RoleKind::Role, Scope::Namespace(ns)) => {
                Ok(RoleKey::new(Scope::namespace(ns.clone()), self.name.clone()))
            }
            (RoleKind::Role, Scope::Cluster) => Err(NameError::InvalidScope {
                kind: self.kind,
                name: self.name.clone(),
            }),
        }
    }
}

impl Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// One rule of a role. Opaque to the engine; interpreted only by the
/// permission graph's `who_can` query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
    pub resource_names: Vec<String>,
    #[serde(rename = "nonResourceURLs")]
    pub non_resource_urls: Vec<String>,
}

impl PolicyRule {
    /// Creates a rule over `resources` in `api_groups` allowing `verbs`.
    pub fn new<G, R, V>(api_groups: G, resources: R, verbs: V) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            api_groups: api_groups.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            verbs: verbs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Restricts the rule to specific object names.
    pub fn with_resource_names<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A Role (namespace scope) or ClusterRole (cluster scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub scope: Scope,
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Role {
    pub fn new(name: impl Into<String>, scope: Scope, rules: Vec<PolicyRule>) -> Self {
        Self {
            name: name.into(),
            scope,
            rules,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn key(&self) -> RoleKey {
        RoleKey::new(self.scope.clone(), self.name.clone())
    }

    pub fn kind(&self) -> RoleKind {
        self.key().kind()
    }

    /// Returns whether `other` defines the same permissions.
    ///
    /// Labels are metadata and do not participate; rule order does not
    /// matter, duplicate rules collapse.
    pub fn same_definition(&self, other: &Role) -> bool {
        if self.key() != other.key() {
            return false;
        }
        let ours: BTreeSet<_> = self.rules.iter().map(rule_sort_key).collect();
        let theirs: BTreeSet<_> = other.rules.iter().map(rule_sort_key).collect();
        ours == theirs
    }
}

fn rule_sort_key(rule: &PolicyRule) -> [Vec<String>; 5] {
    [
        rule.api_groups.clone(),
        rule.resources.clone(),
        rule.verbs.clone(),
        rule.resource_names.clone(),
        rule.non_resource_urls.clone(),
    ]
}

/// Kind of a binding subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "User",
            SubjectKind::Group => "Group",
            SubjectKind::ServiceAccount => "ServiceAccount",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "User" => Some(SubjectKind::User),
            "Group" => Some(SubjectKind::Group),
            "ServiceAccount" => Some(SubjectKind::ServiceAccount),
            _ => None,
        }
    }
}

/// A principal named by a binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
    /// Only meaningful for service accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Subject {
    /// A certificate-authenticated user.
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
            namespace: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.into(),
            namespace: None,
        }
    }

    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn is_user(&self, name: &str) -> bool {
        self.kind == SubjectKind::User && self.name == name
    }
}

/// Identifies a stored RoleBinding or ClusterRoleBinding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindingKey {
    pub scope: Scope,
    pub name: String,
}

impl BindingKey {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }
}

impl Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Cluster => write!(f, "ClusterRoleBinding {}", self.name),
            Scope::Namespace(ns) => write!(f, "RoleBinding {ns}/{}", self.name),
        }
    }
}

/// A RoleBinding (namespace scope) or ClusterRoleBinding (cluster scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub scope: Scope,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Version token for optimistic concurrency; `None` on objects that
    /// have not been read from the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl Binding {
    pub fn new(
        name: impl Into<String>,
        scope: Scope,
        role_ref: RoleRef,
        subjects: Vec<Subject>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            role_ref,
            subjects,
            labels: BTreeMap::new(),
            resource_version: None,
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn key(&self) -> BindingKey {
        BindingKey::new(self.scope.clone(), self.name.clone())
    }

    /// The role this binding grants, or `None` if the reference is invalid
    /// for the binding's scope.
    pub fn target_role(&self) -> Option<RoleKey> {
        self.role_ref.target(&self.scope).ok()
    }

    /// Returns whether the binding names `user` as a `User` subject.
    pub fn grants_user(&self, user: &str) -> bool {
        self.subjects.iter().any(|s| s.is_user(user))
    }

    /// Returns whether this binding grants `role` to `user`.
    pub fn grants(&self, user: &UserName, role: &RoleRef) -> bool {
        &self.role_ref == role && self.grants_user(user.as_str())
    }

    /// Names of every `User` subject.
    pub fn user_subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects
            .iter()
            .filter(|s| s.kind == SubjectKind::User)
            .map(|s| s.name.as_str())
    }

    /// Returns a copy with `user` removed from the subject list.
    pub fn without_user(&self, user: &str) -> Binding {
        let mut binding = self.clone();
        binding.subjects.retain(|s| !s.is_user(user));
        binding
    }

    /// Returns whether `other` is the same grant: same key, same role
    /// reference and the same set of subjects (order-insensitive).
    pub fn same_definition(&self, other: &Binding) -> bool {
        if self.key() != other.key() || self.role_ref != other.role_ref {
            return false;
        }
        let ours: BTreeSet<_> = self.subjects.iter().collect();
        let theirs: BTreeSet<_> = other.subjects.iter().collect();
        ours == theirs
    }
}
