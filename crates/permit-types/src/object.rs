//! References to orchestration objects, used to give errors and logs context.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::rbac::{BindingKey, RoleKey, Scope};

/// Kinds of orchestration objects the system touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    CertificateSigningRequest,
    Namespace,
    ConfigMap,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Role => "Role",
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::RoleBinding => "RoleBinding",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
            ObjectKind::CertificateSigningRequest => "CertificateSigningRequest",
            ObjectKind::Namespace => "Namespace",
            ObjectKind::ConfigMap => "ConfigMap",
        }
    }
}

/// Kind, namespace and name of one object (or of a listing when `name` is
/// empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn cluster(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::new(kind, None, name)
    }

    /// Reference to a whole listing of `kind` (optionally inside one
    /// namespace).
    pub fn listing(kind: ObjectKind, namespace: Option<&str>) -> Self {
        Self::new(kind, namespace, "")
    }

    pub fn role(key: &RoleKey) -> Self {
        match &key.scope {
            Scope::Cluster => Self::cluster(ObjectKind::ClusterRole, key.name.clone()),
            Scope::Namespace(ns) => Self::new(ObjectKind::Role, Some(ns), key.name.clone()),
        }
    }

    pub fn binding(key: &BindingKey) -> Self {
        match &key.scope {
            Scope::Cluster => Self::cluster(ObjectKind::ClusterRoleBinding, key.name.clone()),
            Scope::Namespace(ns) => Self::new(ObjectKind::RoleBinding, Some(ns), key.name.clone()),
        }
    }

    pub fn csr(name: impl Into<String>) -> Self {
        Self::cluster(ObjectKind::CertificateSigningRequest, name)
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.as_str();
        match (&self.namespace, self.name.is_empty()) {
            (Some(ns), true) => write!(f, "{kind} list in {ns}"),
            (None, true) => write!(f, "{kind} list"),
            (Some(ns), false) => write!(f, "{kind} {ns}/{}", self.name),
            (None, false) => write!(f, "{kind} {}", self.name),
        }
    }
}
